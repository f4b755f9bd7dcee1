//! 风险评估与开发模式检测模块

use crate::analyzer::{Impact, RiskFactor, RiskType, SemanticAnalysis, mentions_credentials};
use crate::config::{PatternThresholds, RiskThresholds};
use crate::session::{
    CriticalFileKind, DevelopmentSession, SessionComplexity, SessionStats, critical_file_kind,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static STRUCTURAL_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(function|class|import)\b").expect("valid structural regex"));

static ERROR_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(try|catch|error)\b").expect("valid error keyword regex"));

const FEATURE_KEYWORDS: &[&str] = &["feature", "feat", "add", "implement", "create"];
const BUG_KEYWORDS: &[&str] = &["fix", "bug", "error", "issue", "patch"];
/// 路径中出现这些完整单词时视为安全敏感
const SENSITIVE_WORDS: &[&str] = &[
    "auth",
    "authn",
    "authz",
    "authentication",
    "authorization",
    "security",
    "crypto",
    "cryptography",
    "password",
    "passwords",
    "secret",
    "secrets",
    "token",
    "tokens",
    "credential",
    "credentials",
    "permission",
    "permissions",
    "oauth",
    "oauth2",
    "jwt",
];
const SENSITIVE_EXTENSIONS: &[&str] = &["pem", "key", "p12", "pfx", "crt"];

/// 会话整体风险等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// 根据高/中影响因子的数量推导等级
    pub fn from_factor_counts(high: usize, medium: usize, thresholds: &RiskThresholds) -> Self {
        if high >= thresholds.critical_high_factors {
            RiskLevel::Critical
        } else if high >= thresholds.high_high_factors || medium >= thresholds.high_medium_factors {
            RiskLevel::High
        } else if high >= thresholds.medium_high_factors
            || medium >= thresholds.medium_medium_factors
        {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// 拆分建议：按顶层目录分组的一批文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSuggestion {
    pub scope: String,
    pub files: Vec<PathBuf>,
    pub changed_lines: u64,
}

/// 会话风险
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRisk {
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_suggestions: Vec<SplitSuggestion>,
}

/// 风险评估器
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor {
    thresholds: RiskThresholds,
}

impl RiskAssessor {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    /// 逐条规则评估会话风险，每条触发的规则产生一个因子
    pub fn assess(
        &self,
        session: &DevelopmentSession,
        stats: &SessionStats,
        analysis: &SemanticAnalysis,
    ) -> SessionRisk {
        let t = &self.thresholds;
        let mut factors = Vec::new();
        let mut recommendations: Vec<&'static str> = Vec::new();

        if stats.total_files > t.size_files {
            let impact = if stats.total_files > t.size_files_high {
                Impact::High
            } else {
                Impact::Medium
            };
            factors.push(RiskFactor::new(
                RiskType::Size,
                impact,
                format!("{} files changed", stats.total_files),
            ));
            recommendations.extend(SIZE_RECOMMENDATIONS);
        }

        if stats.changed_lines > t.size_lines {
            let impact = if stats.changed_lines > t.size_lines_high {
                Impact::High
            } else {
                Impact::Medium
            };
            factors.push(RiskFactor::new(
                RiskType::Size,
                impact,
                format!("{} lines changed", stats.changed_lines),
            ));
            recommendations.extend(SIZE_RECOMMENDATIONS);
        }

        let complexity_impact = match stats.complexity {
            SessionComplexity::Critical => Some(Impact::High),
            SessionComplexity::High => Some(Impact::Medium),
            _ => None,
        };
        if let Some(impact) = complexity_impact {
            factors.push(RiskFactor::new(
                RiskType::Complexity,
                impact,
                format!("Session complexity is {}", stats.complexity.as_str()),
            ));
            recommendations.extend(COMPLEXITY_RECOMMENDATIONS);
        }

        let config_files: Vec<&Path> = session
            .touched_paths()
            .into_iter()
            .filter(|p| {
                matches!(
                    critical_file_kind(p),
                    Some(CriticalFileKind::Infrastructure | CriticalFileKind::Environment)
                )
            })
            .collect();
        if !config_files.is_empty() {
            factors.push(RiskFactor::new(
                RiskType::Scope,
                Impact::High,
                format!("System configuration touched: {}", join_paths(&config_files)),
            ));
            recommendations.extend(SCOPE_RECOMMENDATIONS);
        }

        let sensitive_files: Vec<&Path> = session
            .touched_paths()
            .into_iter()
            .filter(|p| is_security_sensitive(p))
            .collect();
        let credential_lines = session
            .all_changes()
            .flat_map(|c| c.added_lines())
            .filter(|l| mentions_credentials(&l.content))
            .count();
        if !sensitive_files.is_empty() || credential_lines > 0 {
            let description = if sensitive_files.is_empty() {
                format!("{credential_lines} added lines reference credentials")
            } else {
                format!("Security-sensitive files changed: {}", join_paths(&sensitive_files))
            };
            factors.push(RiskFactor::new(RiskType::Security, Impact::High, description));
            recommendations.extend(SECURITY_RECOMMENDATIONS);
        }

        let removed_exports: Vec<&str> = analysis
            .structure
            .removed_exports
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        if !removed_exports.is_empty() {
            factors.push(RiskFactor::new(
                RiskType::Breaking,
                Impact::High,
                format!("Exported symbols removed: {}", removed_exports.join(", ")),
            ));
            recommendations.extend(BREAKING_RECOMMENDATIONS);
        }

        let split_suggestions = if factors.iter().any(|f| f.risk_type == RiskType::Size) {
            split_by_directory(session)
        } else {
            Vec::new()
        };

        let level = self.level_for(&factors);
        debug!(
            "Risk level {} from {} factors",
            level.as_str(),
            factors.len()
        );

        let mut unique: Vec<String> = Vec::new();
        for recommendation in recommendations {
            if !unique.iter().any(|r| r == recommendation) {
                unique.push(recommendation.to_string());
            }
        }

        SessionRisk {
            level,
            factors,
            recommendations: unique,
            split_suggestions,
        }
    }

    pub fn level_for(&self, factors: &[RiskFactor]) -> RiskLevel {
        let high = factors.iter().filter(|f| f.impact == Impact::High).count();
        let medium = factors.iter().filter(|f| f.impact == Impact::Medium).count();
        RiskLevel::from_factor_counts(high, medium, &self.thresholds)
    }
}

const SIZE_RECOMMENDATIONS: [&str; 2] = [
    "Split the change into smaller, focused commits",
    "Review the largest files first",
];
const COMPLEXITY_RECOMMENDATIONS: [&str; 1] = ["Add tests that cover the new logic before committing"];
const SCOPE_RECOMMENDATIONS: [&str; 1] =
    ["Verify configuration changes in a staging environment before merging"];
const SECURITY_RECOMMENDATIONS: [&str; 2] = [
    "Request a security-focused review",
    "Make sure no secrets or credentials are committed",
];
const BREAKING_RECOMMENDATIONS: [&str; 2] = [
    "Document the breaking change and update dependent callers",
    "Consider a deprecation period before removing public API",
];

fn join_paths(paths: &[&Path]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 路径或扩展名表明文件与认证、加密或凭据相关
pub fn is_security_sensitive(path: &Path) -> bool {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    SENSITIVE_EXTENSIONS.contains(&extension.as_str())
        || path_words(path)
            .iter()
            .any(|word| SENSITIVE_WORDS.contains(&word.as_str()))
}

/// 把路径切成小写单词：非字母数字字符与驼峰边界都是分隔点
fn path_words(path: &Path) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut after_lower = false;

    for c in path.to_string_lossy().chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            after_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && after_lower {
            words.push(std::mem::take(&mut current));
        }
        after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// 按顶层目录分组；至少两组时才给出建议
fn split_by_directory(session: &DevelopmentSession) -> Vec<SplitSuggestion> {
    let mut groups: BTreeMap<String, (Vec<PathBuf>, u64)> = BTreeMap::new();
    for change in session.distinct_changes() {
        let mut components = change.file_path.components();
        let first = components.next();
        let scope = match (first, components.next()) {
            (Some(dir), Some(_)) => dir.as_os_str().to_string_lossy().to_string(),
            _ => ".".to_string(),
        };
        let entry = groups.entry(scope).or_default();
        entry.1 += change.total_changes();
        entry.0.push(change.file_path);
    }

    if groups.len() < 2 {
        return Vec::new();
    }
    groups
        .into_iter()
        .map(|(scope, (files, changed_lines))| SplitSuggestion {
            scope,
            files,
            changed_lines,
        })
        .collect()
}

/// 开发模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevelopmentPattern {
    RapidIteration,
    FeatureBranch,
    Refactoring,
    BugFixing,
}

impl DevelopmentPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevelopmentPattern::RapidIteration => "rapid-iteration",
            DevelopmentPattern::FeatureBranch => "feature-branch",
            DevelopmentPattern::Refactoring => "refactoring",
            DevelopmentPattern::BugFixing => "bug-fixing",
        }
    }
}

/// 检测到的开发模式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPattern {
    pub pattern: DevelopmentPattern,
    /// 置信度，范围 [0, 1]
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// 开发模式检测器
///
/// 各模式相互独立，没有证据的模式直接省略。
#[derive(Debug, Clone, Default)]
pub struct PatternDetector {
    thresholds: PatternThresholds,
}

impl PatternDetector {
    pub fn new(thresholds: PatternThresholds) -> Self {
        Self { thresholds }
    }

    pub fn detect(&self, session: &DevelopmentSession, stats: &SessionStats) -> Vec<SessionPattern> {
        [
            self.rapid_iteration(session, stats),
            self.feature_branch(session),
            self.refactoring(session),
            self.bug_fixing(session, stats),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn rapid_iteration(
        &self,
        session: &DevelopmentSession,
        stats: &SessionStats,
    ) -> Option<SessionPattern> {
        // 会话刚开始时速率没有意义
        if stats.duration_minutes == 0 {
            return None;
        }
        let hours = stats.duration_minutes as f64 / 60.0;
        let rate = session.change_count() as f64 / hours;
        (rate > self.thresholds.rapid_changes_per_hour).then(|| SessionPattern {
            pattern: DevelopmentPattern::RapidIteration,
            confidence: self.thresholds.rapid_iteration_confidence,
            evidence: vec![format!(
                "{} changes in {} minutes ({rate:.1} per hour)",
                session.change_count(),
                stats.duration_minutes
            )],
        })
    }

    fn feature_branch(&self, session: &DevelopmentSession) -> Option<SessionPattern> {
        let branch = session.base_branch.to_lowercase();
        if branch == "main" || branch == "master" {
            return None;
        }
        let keyword = FEATURE_KEYWORDS.iter().find(|k| branch.contains(*k))?;
        if session.change_count() <= self.thresholds.feature_branch_min_changes {
            return None;
        }
        Some(SessionPattern {
            pattern: DevelopmentPattern::FeatureBranch,
            confidence: self.thresholds.feature_branch_confidence,
            evidence: vec![
                format!("Branch `{}` contains `{keyword}`", session.base_branch),
                format!("{} changes on the branch", session.change_count()),
            ],
        })
    }

    fn refactoring(&self, session: &DevelopmentSession) -> Option<SessionPattern> {
        let eligible: Vec<_> = session
            .distinct_changes()
            .into_iter()
            .filter(|c| c.total_changes() > self.thresholds.refactor_min_file_changes)
            .collect();
        if eligible.is_empty() {
            return None;
        }

        let restructured: Vec<String> = eligible
            .iter()
            .filter(|c| {
                c.added_lines().any(|l| STRUCTURAL_KEYWORD.is_match(&l.content))
                    && c.removed_lines().any(|l| STRUCTURAL_KEYWORD.is_match(&l.content))
            })
            .map(|c| c.file_path.display().to_string())
            .collect();
        let ratio = restructured.len() as f64 / eligible.len() as f64;

        (ratio > self.thresholds.refactor_ratio).then(|| SessionPattern {
            pattern: DevelopmentPattern::Refactoring,
            confidence: ratio,
            evidence: restructured
                .into_iter()
                .map(|file| format!("{file}: structural lines both added and removed"))
                .collect(),
        })
    }

    fn bug_fixing(
        &self,
        session: &DevelopmentSession,
        stats: &SessionStats,
    ) -> Option<SessionPattern> {
        if stats.complexity != SessionComplexity::Low {
            return None;
        }

        let branch = session.base_branch.to_lowercase();
        if let Some(keyword) = BUG_KEYWORDS.iter().find(|k| branch.contains(*k)) {
            return Some(SessionPattern {
                pattern: DevelopmentPattern::BugFixing,
                confidence: self.thresholds.bugfix_branch_confidence,
                evidence: vec![format!(
                    "Branch `{}` contains `{keyword}`",
                    session.base_branch
                )],
            });
        }

        let evidence: Vec<String> = session
            .all_changes()
            .flat_map(|c| {
                c.added_lines()
                    .filter(|l| ERROR_KEYWORD.is_match(&l.content))
                    .map(move |l| {
                        format!("{}: {}", c.file_path.display(), l.content.trim())
                    })
            })
            .collect();
        (!evidence.is_empty()).then(|| SessionPattern {
            pattern: DevelopmentPattern::BugFixing,
            confidence: self.thresholds.bugfix_content_confidence,
            evidence,
        })
    }
}
