//! 分析阈值配置模块
//!
//! 所有启发式阈值都是策略而非机制，集中在这里以便调整

use crate::error::{DiffInsightError, Result};
use serde::{Deserialize, Serialize};

/// 完整的分析配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub session: SessionThresholds,
    pub risk: RiskThresholds,
    pub patterns: PatternThresholds,
    pub quality: QualityThresholds,
}

/// 会话复杂度分级阈值
///
/// 超过某一级的任意阈值即进入该级（文件数或变更行数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionThresholds {
    pub critical_lines: u64,
    pub critical_files: usize,
    pub high_lines: u64,
    pub high_files: usize,
    pub medium_lines: u64,
    pub medium_files: usize,
}

impl Default for SessionThresholds {
    fn default() -> Self {
        Self {
            critical_lines: 1000,
            critical_files: 20,
            high_lines: 500,
            high_files: 10,
            medium_lines: 100,
            medium_files: 5,
        }
    }
}

/// 风险规则阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// 文件数超过该值触发中等规模风险
    pub size_files: usize,
    /// 文件数超过该值时规模风险升级为高
    pub size_files_high: usize,
    /// 变更行数超过该值触发中等规模风险
    pub size_lines: u64,
    /// 变更行数超过该值时规模风险升级为高
    pub size_lines_high: u64,
    /// 高影响因子达到该数量即为 critical
    pub critical_high_factors: usize,
    pub high_high_factors: usize,
    pub high_medium_factors: usize,
    pub medium_high_factors: usize,
    pub medium_medium_factors: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            size_files: 15,
            size_files_high: 25,
            size_lines: 500,
            size_lines_high: 1000,
            critical_high_factors: 3,
            high_high_factors: 2,
            high_medium_factors: 4,
            medium_high_factors: 1,
            medium_medium_factors: 2,
        }
    }
}

/// 开发模式检测阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternThresholds {
    /// 每小时变更数超过该值视为快速迭代
    pub rapid_changes_per_hour: f64,
    pub rapid_iteration_confidence: f64,
    /// 特性分支需要的最少变更数（严格大于）
    pub feature_branch_min_changes: usize,
    pub feature_branch_confidence: f64,
    /// 参与重构判定的文件最少变更行数（严格大于）
    pub refactor_min_file_changes: u64,
    /// 结构性增删文件占比超过该值视为重构
    pub refactor_ratio: f64,
    pub bugfix_branch_confidence: f64,
    pub bugfix_content_confidence: f64,
}

impl Default for PatternThresholds {
    fn default() -> Self {
        Self {
            rapid_changes_per_hour: 10.0,
            rapid_iteration_confidence: 0.7,
            feature_branch_min_changes: 3,
            feature_branch_confidence: 0.9,
            refactor_min_file_changes: 5,
            refactor_ratio: 0.6,
            bugfix_branch_confidence: 0.8,
            bugfix_content_confidence: 0.6,
        }
    }
}

/// 质量评分阈值与扣分权重
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub complexity_penalty_per_branch: f64,
    pub long_function_lines: u32,
    pub long_function_penalty: f64,
    pub max_line_length: usize,
    pub long_line_penalty: f64,
    pub todo_penalty: f64,
    pub magic_number_penalty: f64,
    pub duplicate_block_penalty: f64,
    /// 判定重复代码块的连续行数
    pub duplicate_window: usize,
    pub nested_loop_penalty: f64,
    pub array_chain_penalty: f64,
    pub large_object_penalty: f64,
    /// 对象字面量属性数超过该值视为过大
    pub large_object_properties: usize,
    pub secret_logging_penalty: f64,
    pub dynamic_execution_penalty: f64,
    pub html_injection_penalty: f64,
    pub hardcoded_credential_penalty: f64,
    pub max_test_coverage: f64,
    pub test_ratio_weight: f64,
    /// 每个文件每个维度保留的历史评分数量
    pub history_capacity: usize,
    /// 与历史均值相差超过该值才视为趋势变化
    pub trend_delta: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            complexity_penalty_per_branch: 5.0,
            long_function_lines: 25,
            long_function_penalty: 10.0,
            max_line_length: 120,
            long_line_penalty: 2.0,
            todo_penalty: 1.0,
            magic_number_penalty: 3.0,
            duplicate_block_penalty: 5.0,
            duplicate_window: 4,
            nested_loop_penalty: 10.0,
            array_chain_penalty: 5.0,
            large_object_penalty: 3.0,
            large_object_properties: 20,
            secret_logging_penalty: 20.0,
            dynamic_execution_penalty: 25.0,
            html_injection_penalty: 15.0,
            hardcoded_credential_penalty: 30.0,
            max_test_coverage: 90.0,
            test_ratio_weight: 70.0,
            history_capacity: 10,
            trend_delta: 5.0,
        }
    }
}

impl AnalysisConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if !(s.medium_lines <= s.high_lines && s.high_lines <= s.critical_lines) {
            return Err(DiffInsightError::ConfigError(format!(
                "Session line thresholds must be ascending (medium {} <= high {} <= critical {})",
                s.medium_lines, s.high_lines, s.critical_lines
            )));
        }
        if !(s.medium_files <= s.high_files && s.high_files <= s.critical_files) {
            return Err(DiffInsightError::ConfigError(format!(
                "Session file thresholds must be ascending (medium {} <= high {} <= critical {})",
                s.medium_files, s.high_files, s.critical_files
            )));
        }

        let r = &self.risk;
        if r.size_files > r.size_files_high || r.size_lines > r.size_lines_high {
            return Err(DiffInsightError::ConfigError(
                "Risk size thresholds must not exceed their high counterparts".to_string(),
            ));
        }

        let p = &self.patterns;
        for (name, value) in [
            ("refactor_ratio", p.refactor_ratio),
            ("rapid_iteration_confidence", p.rapid_iteration_confidence),
            ("feature_branch_confidence", p.feature_branch_confidence),
            ("bugfix_branch_confidence", p.bugfix_branch_confidence),
            ("bugfix_content_confidence", p.bugfix_content_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(DiffInsightError::ConfigError(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if p.rapid_changes_per_hour <= 0.0 {
            return Err(DiffInsightError::ConfigError(
                "rapid_changes_per_hour must be positive".to_string(),
            ));
        }

        let q = &self.quality;
        if q.history_capacity == 0 {
            return Err(DiffInsightError::ConfigError(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        if q.duplicate_window < 2 {
            return Err(DiffInsightError::ConfigError(
                "duplicate_window must be at least 2 lines".to_string(),
            ));
        }

        Ok(())
    }
}
