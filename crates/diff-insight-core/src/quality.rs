//! 代码质量评分模块
//!
//! 对任意文件文本按六个维度独立评分：复杂度、可维护性、性能、安全、
//! 测试覆盖与文档。每个维度从基础分出发，按扫描到的问题逐条扣分，
//! 每次扣分都会产生一条问题记录，保证问题列表与分数一致。
//!
//! 各维度的评分函数只读共享阈值，可以并发调用；唯一跨调用保留的状态
//! 是 [`QualityHistory`]，只用于计算趋势。

use crate::analyzer::{
    indent_width, is_comment_line, is_dynamic_execution, is_hardcoded_secret, is_html_sink,
    is_logging_call, is_loop_header, is_test_file_name, mentions_credentials,
};
use crate::config::QualityThresholds;
use crate::error::Result;
use crate::parser::common::{count_branch_keywords, strip_strings_and_comments};
use crate::parser::{CodeStructure, ExtractorFactory, SupportedLanguage};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;
use walkdir::WalkDir;


static TODO_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(TODO|FIXME|HACK|XXX)\b").expect("valid todo regex"));

static NUMBER_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid number regex"));

static CONSTANT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:export\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:(?:const|static|final|readonly)\s+(?:mut\s+)?(?:[\w<>\[\]]+\s+)?[A-Z][A-Z0-9_]*\b|#define\b|enum\b)|^\s*[A-Z][A-Z0-9_]*\s*(?::[^=]+)?=[^=]",
    )
    .expect("valid constant regex")
});

static ARRAY_CHAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\.(?:map|filter|reduce|forEach|flatMap|find|some|every|sort|slice|concat)\([^;]*\)\s*\.(?:map|filter|reduce|forEach|flatMap|find|some|every|sort)\(",
    )
    .expect("valid array chain regex")
});

static BLOCK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:function|class|interface|if|else|for|while|switch|try|catch|finally|fn|impl|struct|enum|trait|mod|match|def|func)\b|=>\s*\{$|\)\s*\{$",
    )
    .expect("valid block header regex")
});

static OBJECT_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:["'][^"']+["']|[A-Za-z_$][\w$-]*)\s*:"#).expect("valid property regex")
});

static DOC_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:///|//!|/\*\*|\*/|\*|//|#(?:[^\[!]|$)|"""|''')"#)
        .expect("valid doc comment regex")
});

static DOCSTRING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*[rRuUbB]?(?:"""|''')"#).expect("valid docstring regex"));

const ALLOWED_NUMBERS: [f64; 6] = [0.0, 1.0, 2.0, 10.0, 100.0, 1000.0];

/// 质量维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Complexity,
    Maintainability,
    Performance,
    Security,
    TestCoverage,
    Documentation,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 6] = [
        QualityDimension::Complexity,
        QualityDimension::Maintainability,
        QualityDimension::Performance,
        QualityDimension::Security,
        QualityDimension::TestCoverage,
        QualityDimension::Documentation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDimension::Complexity => "complexity",
            QualityDimension::Maintainability => "maintainability",
            QualityDimension::Performance => "performance",
            QualityDimension::Security => "security",
            QualityDimension::TestCoverage => "test_coverage",
            QualityDimension::Documentation => "documentation",
        }
    }

    /// 基础分：测试覆盖从 0 开始累加，其余维度从 100 开始扣减
    pub fn base_score(&self) -> f64 {
        match self {
            QualityDimension::TestCoverage => 0.0,
            _ => 100.0,
        }
    }
}

/// 字母等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            Grade::A
        } else if score >= 80.0 {
            Grade::B
        } else if score >= 70.0 {
            Grade::C
        } else if score >= 60.0 {
            Grade::D
        } else {
            Grade::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

/// 问题严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// F 为 error，D 为 warning，其余为 info
    pub fn from_grade(grade: Grade) -> Self {
        match grade {
            Grade::F => Severity::Error,
            Grade::D => Severity::Warning,
            _ => Severity::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// 与历史均值相比的趋势
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    New,
    Improving,
    Stable,
    Declining,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::New => "new",
            Trend::Improving => "improving",
            Trend::Stable => "stable",
            Trend::Declining => "declining",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub auto_fixable: bool,
}

/// 单个维度的评分结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub dimension: QualityDimension,
    /// 范围 [0, 100]
    pub score: f64,
    pub grade: Grade,
    pub trend: Trend,
    pub issues: Vec<QualityIssue>,
    pub suggestions: Vec<String>,
}

/// 单个文件的六维度报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileQualityReport {
    pub file: PathBuf,
    pub metrics: Vec<QualityMetric>,
    pub overall_score: f64,
    pub overall_grade: Grade,
}

impl FileQualityReport {
    fn new(file: PathBuf, metrics: Vec<QualityMetric>) -> Self {
        let overall_score = if metrics.is_empty() {
            0.0
        } else {
            metrics.iter().map(|m| m.score).sum::<f64>() / metrics.len() as f64
        };
        Self {
            file,
            metrics,
            overall_score,
            overall_grade: Grade::from_score(overall_score),
        }
    }

    pub fn metric(&self, dimension: QualityDimension) -> Option<&QualityMetric> {
        self.metrics.iter().find(|m| m.dimension == dimension)
    }

    pub fn issue_count(&self) -> usize {
        self.metrics.iter().map(|m| m.issues.len()).sum()
    }
}

/// 每个（文件, 维度）最近 N 次评分
#[derive(Debug, Clone)]
pub struct QualityHistory {
    capacity: usize,
    trend_delta: f64,
    entries: HashMap<(PathBuf, QualityDimension), VecDeque<f64>>,
}

impl QualityHistory {
    pub fn new(capacity: usize, trend_delta: f64) -> Self {
        Self {
            capacity: capacity.max(1),
            trend_delta,
            entries: HashMap::new(),
        }
    }

    /// 记录一次评分，返回与此前均值相比的趋势
    pub fn record(&mut self, file: &Path, dimension: QualityDimension, score: f64) -> Trend {
        let scores = self
            .entries
            .entry((file.to_path_buf(), dimension))
            .or_default();

        let trend = if scores.is_empty() {
            Trend::New
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            if score - mean > self.trend_delta {
                Trend::Improving
            } else if mean - score > self.trend_delta {
                Trend::Declining
            } else {
                Trend::Stable
            }
        };

        scores.push_back(score);
        while scores.len() > self.capacity {
            scores.pop_front();
        }
        trend
    }

    pub fn scores(&self, file: &Path, dimension: QualityDimension) -> Vec<f64> {
        self.entries
            .get(&(file.to_path_buf(), dimension))
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// 一次扣分（测试覆盖维度为加分）及其对应的问题
struct Finding {
    points: f64,
    message: String,
    line: Option<u32>,
    auto_fixable: bool,
}

impl Finding {
    fn new(points: f64, message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            points,
            message: message.into(),
            line,
            auto_fixable: false,
        }
    }

    fn fixable(mut self) -> Self {
        self.auto_fixable = true;
        self
    }
}

/// 扣分汇总为维度结果：分数截断到 [0, 100]，问题的严重程度取决于最终等级
fn penalized(dimension: QualityDimension, findings: Vec<Finding>) -> QualityMetric {
    let penalty: f64 = findings.iter().map(|f| f.points).sum();
    let score = (dimension.base_score() - penalty).clamp(0.0, 100.0);
    let grade = Grade::from_score(score);
    let issues = to_issues(findings, grade);
    QualityMetric {
        dimension,
        score,
        grade,
        trend: Trend::New,
        suggestions: suggestions_for(dimension, &issues),
        issues,
    }
}

fn to_issues(findings: Vec<Finding>, grade: Grade) -> Vec<QualityIssue> {
    let severity = Severity::from_grade(grade);
    findings
        .into_iter()
        .map(|f| QualityIssue {
            severity,
            message: f.message,
            line: f.line,
            auto_fixable: f.auto_fixable,
        })
        .collect()
}

fn suggestions_for(dimension: QualityDimension, issues: &[QualityIssue]) -> Vec<String> {
    if issues.is_empty() {
        return Vec::new();
    }
    let fixed: &[&str] = match dimension {
        QualityDimension::Complexity => &[
            "Extract nested branches into smaller helper functions",
            "Prefer early returns over deeply nested conditionals",
        ],
        QualityDimension::Maintainability => &[
            "Replace magic numbers with named constants",
            "Extract duplicated blocks into a shared function",
        ],
        QualityDimension::Performance => &[
            "Avoid nested iteration over large collections",
            "Combine chained array operations into a single pass",
        ],
        QualityDimension::Security => &[
            "Load credentials from the environment or a secret store",
            "Escape user-controlled content before rendering it",
        ],
        QualityDimension::TestCoverage => &["Add a test file next to the source file"],
        QualityDimension::Documentation => &["Add doc comments to public functions"],
    };
    fixed.iter().map(|s| s.to_string()).collect()
}

/// 源代码行及其 1 起始行号，跳过空行
fn code_lines(source: &str) -> impl Iterator<Item = (u32, &str)> {
    source
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| (i as u32 + 1, line))
}

/// 逻辑代码行：在 `code_lines` 基础上再跳过注释行，以及块注释与文档字符串的内部
fn logic_lines(source: &str) -> Vec<(u32, &str)> {
    let mut lines = Vec::new();
    let mut closing: Option<&'static str> = None;

    for (number, line) in code_lines(source) {
        let trimmed = line.trim();
        if let Some(end) = closing {
            if trimmed.contains(end) {
                closing = None;
            }
            continue;
        }
        if let Some(end) = block_opener(trimmed) {
            closing = Some(end);
            continue;
        }
        if !is_comment_line(line) {
            lines.push((number, line));
        }
    }
    lines
}

/// 行首开启、且本行未闭合的块注释或文档字符串，返回其结束标记
fn block_opener(trimmed: &str) -> Option<&'static str> {
    [("/*", "*/"), ("\"\"\"", "\"\"\""), ("'''", "'''")]
        .into_iter()
        .find_map(|(open, end)| {
            let rest = trimmed.strip_prefix(open)?;
            (!rest.contains(end)).then_some(end)
        })
}

fn non_empty_line_count(source: &str) -> usize {
    source.lines().filter(|l| !l.trim().is_empty()).count()
}

/// 质量评分器
#[derive(Debug, Clone)]
pub struct QualityScorer {
    thresholds: QualityThresholds,
    history: QualityHistory,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityThresholds::default())
    }
}

impl QualityScorer {
    pub fn new(thresholds: QualityThresholds) -> Self {
        let history = QualityHistory::new(thresholds.history_capacity, thresholds.trend_delta);
        Self {
            thresholds,
            history,
        }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    pub fn history(&self) -> &QualityHistory {
        &self.history
    }

    /// 计算全部六个维度，不读写历史（趋势均为 New）
    pub fn evaluate(&self, path: &Path, source: &str) -> FileQualityReport {
        let structure = ExtractorFactory::extract_file(path, source);
        let metrics = QualityDimension::ALL
            .iter()
            .map(|&dimension| self.score_with_structure(dimension, path, source, structure.as_ref()))
            .collect();
        FileQualityReport::new(path.to_path_buf(), metrics)
    }

    /// 计算全部维度并记录历史，得到趋势
    pub fn analyze(&mut self, path: &Path, source: &str) -> FileQualityReport {
        let mut report = self.evaluate(path, source);
        self.record(&mut report);
        report
    }

    /// 读取磁盘文件后分析
    pub fn analyze_path(&mut self, path: &Path) -> Result<FileQualityReport> {
        let source = std::fs::read_to_string(path)?;
        Ok(self.analyze(path, &source))
    }

    /// 把报告中的分数写入历史，并回填趋势
    pub fn record(&mut self, report: &mut FileQualityReport) {
        for metric in &mut report.metrics {
            metric.trend = self.history.record(&report.file, metric.dimension, metric.score);
        }
    }

    /// 单独计算一个维度
    pub fn score_dimension(
        &self,
        dimension: QualityDimension,
        path: &Path,
        source: &str,
    ) -> QualityMetric {
        let structure = match dimension {
            QualityDimension::Complexity | QualityDimension::Documentation => {
                ExtractorFactory::extract_file(path, source)
            }
            _ => None,
        };
        self.score_with_structure(dimension, path, source, structure.as_ref())
    }

    fn score_with_structure(
        &self,
        dimension: QualityDimension,
        path: &Path,
        source: &str,
        structure: Option<&CodeStructure>,
    ) -> QualityMetric {
        let comment = ExtractorFactory::detect_language(path)
            .map(|l| l.line_comment())
            .unwrap_or("//");
        let metric = match dimension {
            QualityDimension::Complexity => self.complexity(source, comment, structure),
            QualityDimension::Maintainability => self.maintainability(source, comment),
            QualityDimension::Performance => self.performance(source),
            QualityDimension::Security => self.security(source),
            QualityDimension::TestCoverage => self.test_coverage(path, source),
            QualityDimension::Documentation => documentation(path, source, structure),
        };
        debug!(
            "{} {}: {:.1} ({})",
            path.display(),
            dimension.as_str(),
            metric.score,
            metric.grade.as_str()
        );
        metric
    }

    fn complexity(
        &self,
        source: &str,
        comment: &str,
        structure: Option<&CodeStructure>,
    ) -> QualityMetric {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        for (number, line) in logic_lines(source) {
            let branches = count_branch_keywords(line, comment);
            if branches > 0 {
                findings.push(Finding::new(
                    t.complexity_penalty_per_branch * f64::from(branches),
                    format!("{branches} decision point(s) add to cyclomatic complexity"),
                    Some(number),
                ));
            }
        }

        for function in structure.map(|s| s.functions.as_slice()).unwrap_or_default() {
            if function.line_count() > t.long_function_lines {
                findings.push(Finding::new(
                    t.long_function_penalty,
                    format!(
                        "Function `{}` spans {} lines (limit {})",
                        function.name,
                        function.line_count(),
                        t.long_function_lines
                    ),
                    Some(function.start_line),
                ));
            }
        }

        penalized(QualityDimension::Complexity, findings)
    }

    fn maintainability(&self, source: &str, comment: &str) -> QualityMetric {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        for (number, line) in code_lines(source) {
            let length = line.chars().count();
            if length > t.max_line_length {
                findings.push(
                    Finding::new(
                        t.long_line_penalty,
                        format!("Line is {length} characters long (limit {})", t.max_line_length),
                        Some(number),
                    )
                    .fixable(),
                );
            }
            if let Some(marker) = TODO_MARKER.find(line) {
                findings.push(Finding::new(
                    t.todo_penalty,
                    format!("{} marker left in code", marker.as_str()),
                    Some(number),
                ));
            }
            for literal in magic_numbers(line, comment) {
                findings.push(Finding::new(
                    t.magic_number_penalty,
                    format!("Magic number {literal}"),
                    Some(number),
                ));
            }
        }

        for line in duplicate_blocks(source, t.duplicate_window) {
            findings.push(Finding::new(
                t.duplicate_block_penalty,
                format!("Block duplicates earlier code ({} lines)", t.duplicate_window),
                Some(line),
            ));
        }

        penalized(QualityDimension::Maintainability, findings)
    }

    fn performance(&self, source: &str) -> QualityMetric {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        for line in nested_loops(source) {
            findings.push(Finding::new(
                t.nested_loop_penalty,
                "Nested loop",
                Some(line),
            ));
        }
        for (number, line) in code_lines(source) {
            if ARRAY_CHAIN.is_match(line) {
                findings.push(Finding::new(
                    t.array_chain_penalty,
                    "Chained array operations iterate the collection more than once",
                    Some(number),
                ));
            }
        }
        for (line, properties) in large_objects(source, t.large_object_properties) {
            findings.push(Finding::new(
                t.large_object_penalty,
                format!("Object literal with {properties} properties"),
                Some(line),
            ));
        }

        penalized(QualityDimension::Performance, findings)
    }

    fn security(&self, source: &str) -> QualityMetric {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        for (number, line) in code_lines(source) {
            if is_comment_line(line) {
                continue;
            }
            if is_logging_call(line) && mentions_credentials(line) {
                findings.push(Finding::new(
                    t.secret_logging_penalty,
                    "Sensitive value written to logs",
                    Some(number),
                ));
            }
            if is_dynamic_execution(line) {
                findings.push(Finding::new(
                    t.dynamic_execution_penalty,
                    "Dynamic code execution",
                    Some(number),
                ));
            }
            if is_html_sink(line) {
                findings.push(Finding::new(
                    t.html_injection_penalty,
                    "Unescaped HTML injection sink",
                    Some(number),
                ));
            }
            if is_hardcoded_secret(line) {
                findings.push(Finding::new(
                    t.hardcoded_credential_penalty,
                    "Hardcoded credential",
                    Some(number),
                ));
            }
        }

        penalized(QualityDimension::Security, findings)
    }

    fn test_coverage(&self, path: &Path, source: &str) -> QualityMetric {
        let t = &self.thresholds;
        let dimension = QualityDimension::TestCoverage;
        let test_files = find_sibling_tests(path);

        let source_lines = non_empty_line_count(source);
        let test_lines: usize = test_files
            .iter()
            .filter_map(|p| std::fs::read_to_string(p).ok())
            .map(|text| non_empty_line_count(&text))
            .sum();

        let score = if test_files.is_empty() || source_lines == 0 {
            0.0
        } else {
            (test_lines as f64 / source_lines as f64 * t.test_ratio_weight)
                .min(t.max_test_coverage)
        };
        let grade = Grade::from_score(score);

        let mut findings = Vec::new();
        if test_files.is_empty() {
            findings.push(Finding::new(0.0, "No test file found for this source file", None));
        } else if matches!(grade, Grade::D | Grade::F) {
            findings.push(Finding::new(
                0.0,
                format!(
                    "{test_lines} test lines for {source_lines} source lines in {}",
                    test_files
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                None,
            ));
        }

        let issues = to_issues(findings, grade);
        QualityMetric {
            dimension,
            score,
            grade,
            trend: Trend::New,
            suggestions: suggestions_for(dimension, &issues),
            issues,
        }
    }
}

fn documentation(path: &Path, source: &str, structure: Option<&CodeStructure>) -> QualityMetric {
    let dimension = QualityDimension::Documentation;
    let functions = structure.map(|s| s.functions.as_slice()).unwrap_or_default();
    let python = ExtractorFactory::detect_language(path) == Some(SupportedLanguage::Python);
    let lines: Vec<&str> = source.lines().collect();

    let undocumented: Vec<_> = functions
        .iter()
        .filter(|f| !is_documented(&lines, f.start_line, python))
        .collect();

    let score = if functions.is_empty() {
        100.0
    } else {
        (functions.len() - undocumented.len()) as f64 / functions.len() as f64 * 100.0
    };
    let grade = Grade::from_score(score);

    let findings = undocumented
        .iter()
        .map(|f| {
            Finding::new(
                0.0,
                format!("Function `{}` has no documentation", f.name),
                Some(f.start_line),
            )
        })
        .collect();
    let issues = to_issues(findings, grade);

    QualityMetric {
        dimension,
        score,
        grade,
        trend: Trend::New,
        suggestions: suggestions_for(dimension, &issues),
        issues,
    }
}

/// 函数前方（跳过装饰器与属性）是否有注释；Python 还接受函数体首行的文档字符串
fn is_documented(lines: &[&str], start_line: u32, python: bool) -> bool {
    let start = start_line as usize;
    if start == 0 || start > lines.len() {
        return false;
    }

    if python {
        let docstring = lines[start..]
            .iter()
            .find(|l| !l.trim().is_empty())
            .is_some_and(|l| DOCSTRING.is_match(l));
        if docstring {
            return true;
        }
    }

    lines[..start - 1]
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| !l.starts_with('@') && !l.starts_with("#["))
        .is_some_and(|l| !l.is_empty() && DOC_COMMENT.is_match(l))
}

/// 非常量声明、非注释行中的魔法数字
fn magic_numbers(line: &str, comment: &str) -> Vec<String> {
    if is_comment_line(line) || CONSTANT_DECLARATION.is_match(line) {
        return Vec::new();
    }
    let code = strip_strings_and_comments(line, comment);
    NUMBER_LITERAL
        .find_iter(&code)
        .map(|m| m.as_str())
        .filter(|literal| {
            literal
                .parse::<f64>()
                .map(|value| !ALLOWED_NUMBERS.contains(&value))
                .unwrap_or(false)
        })
        .map(str::to_string)
        .collect()
}

/// 连续 `window` 行规范化后的代码在后文再次出现，返回重复块的起始行号
fn duplicate_blocks(source: &str, window: usize) -> Vec<u32> {
    let lines: Vec<(u32, String)> = code_lines(source)
        .filter(|(_, line)| !is_comment_line(line))
        .map(|(number, line)| (number, line.split_whitespace().collect::<Vec<_>>().join(" ")))
        .filter(|(_, line)| line.len() >= 4 && line.chars().any(char::is_alphanumeric))
        .collect();
    if window == 0 || lines.len() < window * 2 {
        return Vec::new();
    }

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    let mut i = 0;
    while i + window <= lines.len() {
        let key = lines[i..i + window]
            .iter()
            .map(|(_, l)| l.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        match first_seen.get(&key) {
            Some(&first) if i >= first + window => {
                duplicates.push(lines[i].0);
                i += window;
                continue;
            }
            Some(_) => {}
            None => {
                first_seen.insert(key, i);
            }
        }
        i += 1;
    }
    duplicates
}

/// 按缩进跟踪循环栈，返回所有内层循环的行号
fn nested_loops(source: &str) -> Vec<u32> {
    let mut stack: Vec<usize> = Vec::new();
    let mut nested = Vec::new();
    for (number, line) in code_lines(source) {
        if is_comment_line(line) {
            continue;
        }
        let indent = indent_width(line);
        while stack.last().is_some_and(|&top| top >= indent) {
            stack.pop();
        }
        if is_loop_header(line) {
            if !stack.is_empty() {
                nested.push(number);
            }
            stack.push(indent);
        }
    }
    nested
}

/// 属性数超过上限的对象字面量：返回（起始行号, 属性数）
fn large_objects(source: &str, limit: usize) -> Vec<(u32, usize)> {
    let mut found = Vec::new();
    let mut open: Option<(u32, usize)> = None;
    let mut depth: i64 = 0;

    for (number, line) in code_lines(source) {
        let code = strip_strings_and_comments(line, "//");
        let trimmed = code.trim_end();

        match open.as_mut() {
            None => {
                let starts_literal = trimmed.ends_with('{')
                    && (trimmed.contains('=') || trimmed.contains('(') || trimmed.contains("return"))
                    && !BLOCK_HEADER.is_match(trimmed);
                if starts_literal {
                    open = Some((number, 0));
                    depth = 1;
                }
            }
            Some((start, properties)) => {
                if depth == 1 && OBJECT_PROPERTY.is_match(line) {
                    *properties += 1;
                }
                depth += trimmed.matches('{').count() as i64;
                depth -= trimmed.matches('}').count() as i64;
                if depth <= 0 {
                    if *properties > limit {
                        found.push((*start, *properties));
                    }
                    open = None;
                }
            }
        }
    }
    found
}

/// 在同目录及相邻测试目录中查找与源文件对应的测试文件
pub fn find_sibling_tests(path: &Path) -> Vec<PathBuf> {
    let Some(stem) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
    else {
        return Vec::new();
    };
    if stem.is_empty() {
        return Vec::new();
    }

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let mut roots = vec![parent.clone()];
    if let Some(grandparent) = parent.parent() {
        for dir in ["tests", "test", "__tests__"] {
            let candidate = grandparent.join(dir);
            if candidate != parent {
                roots.push(candidate);
            }
        }
    }

    let mut found = BTreeSet::new();
    for root in roots.iter().filter(|r| r.is_dir()) {
        for entry in WalkDir::new(root)
            .max_depth(2)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let candidate = entry.path();
            if candidate == path {
                continue;
            }
            let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let in_test_dir = candidate
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str())
                .is_some_and(|n| matches!(n, "tests" | "test" | "__tests__"));
            if (is_test_file_name(name) || in_test_dir) && test_subject(name) == stem {
                found.insert(candidate.to_path_buf());
            }
        }
    }
    found.into_iter().collect()
}

/// 测试文件名对应的被测文件名主干
fn test_subject(file_name: &str) -> &str {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let stem = stem.strip_prefix("test_").unwrap_or(stem);
    stem.strip_suffix("_test")
        .or_else(|| stem.strip_suffix("_spec"))
        .unwrap_or(stem)
}
