//! diff-insight-core - 代码变更分析与风险评估核心库
//!
//! 解析工作区 diff，提取代码结构，对变更做语义分类，
//! 按开发会话聚合统计并评估风险，同时为单个文件给出多维度质量评分。

pub mod analyzer;
pub mod config;
pub mod error;
pub mod git;
pub mod parser;
pub mod performance;
pub mod quality;
pub mod risk;
pub mod session;
pub mod source;

// 重新导出主要的公共 API
pub use analyzer::{
    ChangeClassification, ChangeKind, ChangePattern, ComplexityMetrics, FileCategory, Impact,
    PatternKind, RiskFactor, RiskType, SemanticAnalysis, SemanticAnalyzer, StructureDelta,
};
pub use config::{
    AnalysisConfig, PatternThresholds, QualityThresholds, RiskThresholds, SessionThresholds,
};
pub use error::{DiffInsightError, Result};
pub use git::{ChangeType, DiffHunk, DiffLine, DiffLineType, DiffParser, FileChange};
pub use parser::{
    ApiRoute, ClassInfo, CodeStructure, ExtractorFactory, FunctionInfo, HttpMethod, ImportInfo,
    StructureExtractor, SupportedLanguage,
};
pub use performance::{BatchQualityScorer, BatchResult, PerformanceMonitor, PerformanceStats};
pub use quality::{
    FileQualityReport, Grade, QualityDimension, QualityHistory, QualityIssue, QualityMetric,
    QualityScorer, Severity, Trend,
};
pub use risk::{
    DevelopmentPattern, PatternDetector, RiskAssessor, RiskLevel, SessionPattern, SessionRisk,
    SplitSuggestion,
};
pub use session::{
    DevelopmentSession, SessionComplexity, SessionSnapshot, SessionStats, SessionTracker,
};
pub use source::{ChangeSource, GitChangeSource, RawDiff, StaticChangeSource};
