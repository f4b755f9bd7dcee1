//! 开发会话聚合模块
//!
//! 会话持有工作区与暂存区的变更列表。统计、风险与模式都是从这两个列表
//! 即时推导出的投影，每次读取都重新计算，不做增量修补。

use crate::analyzer::{FileCategory, SemanticAnalysis, SemanticAnalyzer};
use crate::config::{AnalysisConfig, SessionThresholds};
use crate::error::{DiffInsightError, Result};
use crate::git::{ChangeType, FileChange};
use crate::risk::{PatternDetector, RiskAssessor, SessionPattern, SessionRisk};
use crate::source::{ChangeSource, validate_commit_hash};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

/// 删除行中出现这些词，视为可能的破坏性删除
static STRUCTURAL_REMOVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(export|function|class)\b").expect("valid removal regex"));

/// 会话复杂度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionComplexity {
    Low,
    Medium,
    High,
    Critical,
}

impl SessionComplexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionComplexity::Low => "low",
            SessionComplexity::Medium => "medium",
            SessionComplexity::High => "high",
            SessionComplexity::Critical => "critical",
        }
    }

    /// 按文件数与变更行数分级；`has_critical_change` 直接判为 critical
    pub fn classify(
        file_count: usize,
        changed_lines: u64,
        has_critical_change: bool,
        thresholds: &SessionThresholds,
    ) -> Self {
        if has_critical_change
            || changed_lines > thresholds.critical_lines
            || file_count > thresholds.critical_files
        {
            SessionComplexity::Critical
        } else if changed_lines > thresholds.high_lines || file_count > thresholds.high_files {
            SessionComplexity::High
        } else if changed_lines > thresholds.medium_lines || file_count > thresholds.medium_files {
            SessionComplexity::Medium
        } else {
            SessionComplexity::Low
        }
    }
}

/// 关键文件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriticalFileKind {
    Manifest,
    Infrastructure,
    Environment,
    Migration,
}

/// 判断路径是否属于依赖清单、基础设施配置、环境变量或数据库迁移
pub fn critical_file_kind(path: &Path) -> Option<CriticalFileKind> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let lowered = path.to_string_lossy().replace('\\', "/").to_ascii_lowercase();

    if FileCategory::of(path) == FileCategory::Manifest {
        return Some(CriticalFileKind::Manifest);
    }
    if file_name.starts_with(".env") {
        return Some(CriticalFileKind::Environment);
    }
    if lowered.split('/').any(|c| c.contains("migration") || c == "migrate") {
        return Some(CriticalFileKind::Migration);
    }

    let infra_dir = ["k8s", "kubernetes", "helm", "terraform", "deploy", "infra"];
    if file_name.starts_with("Dockerfile")
        || file_name.starts_with("docker-compose")
        || file_name == "Jenkinsfile"
        || file_name == ".gitlab-ci.yml"
        || file_name == "nginx.conf"
        || lowered.ends_with(".tf")
        || lowered.ends_with(".tfvars")
        || lowered.starts_with(".github/workflows/")
        || lowered.split('/').any(|c| infra_dir.contains(&c))
    {
        return Some(CriticalFileKind::Infrastructure);
    }
    None
}

/// 会话累计统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// 工作区与暂存区按路径去重后的文件数
    pub total_files: usize,
    pub insertions: u64,
    pub deletions: u64,
    pub changed_lines: u64,
    pub complexity: SessionComplexity,
    pub duration_minutes: u64,
}

impl SessionStats {
    /// 从会话当前的变更列表推导统计信息
    pub fn compute(
        session: &DevelopmentSession,
        thresholds: &SessionThresholds,
        now: DateTime<Utc>,
    ) -> Self {
        let total_files = session.touched_paths().len();
        let insertions: u64 = session.all_changes().map(|c| u64::from(c.insertions)).sum();
        let deletions: u64 = session.all_changes().map(|c| u64::from(c.deletions)).sum();
        let changed_lines = insertions + deletions;

        let complexity = SessionComplexity::classify(
            total_files,
            changed_lines,
            session.has_critical_change(),
            thresholds,
        );

        Self {
            total_files,
            insertions,
            deletions,
            changed_lines,
            complexity,
            duration_minutes: session.elapsed_minutes(now),
        }
    }
}

/// 一次开发会话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub base_commit: String,
    pub base_branch: String,
    pub working: Vec<FileChange>,
    pub staged: Vec<FileChange>,
}

impl DevelopmentSession {
    /// 在给定的基准提交与分支上开始新会话，变更列表为空
    pub fn start(base_commit: String, base_branch: String, start_time: DateTime<Utc>) -> Self {
        let short = base_commit.get(..7).unwrap_or(&base_commit);
        let id = format!("session-{}-{}", start_time.format("%Y%m%d%H%M%S"), short);
        Self {
            id,
            start_time,
            base_commit,
            base_branch,
            working: Vec::new(),
            staged: Vec::new(),
        }
    }

    /// 工作区与暂存区的全部变更（同一文件可能出现两次）
    pub fn all_changes(&self) -> impl Iterator<Item = &FileChange> {
        self.working.iter().chain(self.staged.iter())
    }

    /// 变更记录总数
    pub fn change_count(&self) -> usize {
        self.working.len() + self.staged.len()
    }

    pub fn touched_paths(&self) -> BTreeSet<&Path> {
        self.all_changes().map(|c| c.file_path.as_path()).collect()
    }

    /// 按路径合并工作区与暂存区的变更
    ///
    /// 同一路径的两条记录合并为一条：差异块先暂存区后工作区，计数相加。
    /// 暂存区记录的新增、删除或重命名类型优先于工作区的修改类型。
    pub fn distinct_changes(&self) -> Vec<FileChange> {
        let mut merged: Vec<FileChange> = Vec::new();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for change in self.staged.iter().chain(self.working.iter()) {
            match index.get(&change.file_path) {
                Some(&at) => {
                    let existing = &mut merged[at];
                    existing.insertions = existing.insertions.saturating_add(change.insertions);
                    existing.deletions = existing.deletions.saturating_add(change.deletions);
                    existing.is_binary |= change.is_binary;
                    existing.hunks.extend(change.hunks.iter().cloned());
                    if existing.change_type == ChangeType::Modified {
                        existing.change_type = change.change_type.clone();
                    }
                }
                None => {
                    index.insert(change.file_path.clone(), merged.len());
                    merged.push(change.clone());
                }
            }
        }
        merged
    }

    /// 是否触及关键文件，或删除了疑似导出的结构
    pub fn has_critical_change(&self) -> bool {
        self.all_changes().any(|change| {
            critical_file_kind(&change.file_path).is_some()
                || change
                    .removed_lines()
                    .any(|line| STRUCTURAL_REMOVAL.is_match(&line.content))
        })
    }

    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((now - self.start_time).num_minutes()).unwrap_or(0)
    }
}

/// 提供给渲染层的完整会话快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: DevelopmentSession,
    pub stats: SessionStats,
    pub risk: SessionRisk,
    pub patterns: Vec<SessionPattern>,
}

/// 会话跟踪器
///
/// `refresh` 需要 `&mut self`，同一会话同一时间只能有一次刷新。
pub struct SessionTracker<S: ChangeSource> {
    source: S,
    config: AnalysisConfig,
    analyzer: SemanticAnalyzer,
    session: Option<DevelopmentSession>,
}

impl<S: ChangeSource> SessionTracker<S> {
    pub fn new(source: S, config: AnalysisConfig) -> Self {
        Self {
            source,
            config,
            analyzer: SemanticAnalyzer::new(),
            session: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// 以当前提交与分支为基准创建新会话
    ///
    /// 变更来源给出的提交哈希格式不合法时返回 `InvalidCommitHash`。
    pub fn initialize(&mut self) -> Result<&DevelopmentSession> {
        let commit = self.source.current_commit()?;
        validate_commit_hash(&commit)?;
        let branch = self.source.current_branch()?;
        let session = DevelopmentSession::start(commit, branch, Utc::now());
        info!(
            "Started session {} on {} at {}",
            session.id, session.base_branch, session.base_commit
        );
        Ok(self.session.insert(session))
    }

    /// 若调用方认为旧会话仍然有效则继续使用，否则新建
    pub fn initialize_or_resume<F>(
        &mut self,
        previous: Option<DevelopmentSession>,
        is_valid: F,
    ) -> Result<&DevelopmentSession>
    where
        F: FnOnce(&DevelopmentSession) -> bool,
    {
        let Some(session) = previous else {
            return self.initialize();
        };
        if is_valid(&session) {
            info!("Resumed session {}", session.id);
            Ok(self.session.insert(session))
        } else {
            debug!("Discarding stale session {}", session.id);
            self.initialize()
        }
    }

    /// 从变更来源重新拉取工作区与暂存区变更
    pub fn refresh(&mut self) -> Result<&DevelopmentSession> {
        let session = self.session.as_mut().ok_or(DiffInsightError::NoActiveSession)?;
        let working = self.source.working_changes()?.parse();
        let staged = self.source.staged_changes()?.parse();
        debug!(
            "Refreshed session {}: {} working, {} staged",
            session.id,
            working.len(),
            staged.len()
        );
        session.working = working;
        session.staged = staged;
        Ok(session)
    }

    /// 是否存在会话活动：本地变更或尚未推送的提交
    pub fn has_changes(&self) -> Result<bool> {
        let session = self.session()?;
        if session.change_count() > 0 {
            return Ok(true);
        }
        self.source.has_unpushed_commits()
    }

    pub fn session(&self) -> Result<&DevelopmentSession> {
        self.session.as_ref().ok_or(DiffInsightError::NoActiveSession)
    }

    /// 结束跟踪并交出会话，供下次 `initialize_or_resume` 使用
    pub fn into_session(self) -> Option<DevelopmentSession> {
        self.session
    }

    pub fn stats(&self) -> Result<SessionStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<SessionStats> {
        Ok(SessionStats::compute(self.session()?, &self.config.session, now))
    }

    /// 对合并后的变更做语义分析
    pub fn analysis(&self) -> Result<SemanticAnalysis> {
        let changes = self.session()?.distinct_changes();
        Ok(self.analyzer.analyze(&changes))
    }

    pub fn risk(&self) -> Result<SessionRisk> {
        let session = self.session()?;
        let stats = SessionStats::compute(session, &self.config.session, Utc::now());
        let analysis = self.analyzer.analyze(&session.distinct_changes());
        Ok(RiskAssessor::new(self.config.risk.clone()).assess(session, &stats, &analysis))
    }

    pub fn patterns(&self) -> Result<Vec<SessionPattern>> {
        let session = self.session()?;
        let stats = SessionStats::compute(session, &self.config.session, Utc::now());
        Ok(PatternDetector::new(self.config.patterns.clone()).detect(session, &stats))
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.snapshot_at(Utc::now())
    }

    /// 以指定时刻计算全部投影
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> Result<SessionSnapshot> {
        let session = self.session()?;
        let stats = SessionStats::compute(session, &self.config.session, now);
        let analysis = self.analyzer.analyze(&session.distinct_changes());
        let risk = RiskAssessor::new(self.config.risk.clone()).assess(session, &stats, &analysis);
        let patterns = PatternDetector::new(self.config.patterns.clone()).detect(session, &stats);

        Ok(SessionSnapshot {
            session: session.clone(),
            stats,
            risk,
            patterns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RawDiff, StaticChangeSource};
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const UTIL_DIFF: &str = "diff --git a/src/util.ts b/src/util.ts
--- a/src/util.ts
+++ b/src/util.ts
@@ -1,2 +1,3 @@
 const a = 1;
-const b = 2;
+const b = 3;
+const c = 4;
";

    const README_DIFF: &str = "diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1 +1,2 @@
 # Title
+More text
";

    fn source() -> StaticChangeSource {
        StaticChangeSource::new("feature/jwt-auth", "0123456789abcdef0123456789abcdef01234567")
            .with_working(RawDiff::new("2\t1\tsrc/util.ts\n", UTIL_DIFF))
            .with_staged(RawDiff::new(
                "2\t1\tsrc/util.ts\n1\t0\tREADME.md\n",
                format!("{UTIL_DIFF}{README_DIFF}"),
            ))
    }

    fn change(path: &str, insertions: u32, deletions: u32) -> FileChange {
        FileChange {
            file_path: PathBuf::from(path),
            change_type: crate::git::ChangeType::Modified,
            insertions,
            deletions,
            hunks: Vec::new(),
            is_binary: false,
        }
    }

    #[test]
    fn test_uninitialized_tracker_fails_loudly() {
        let tracker = SessionTracker::new(source(), AnalysisConfig::default());
        assert!(matches!(tracker.stats(), Err(DiffInsightError::NoActiveSession)));
        assert!(matches!(tracker.has_changes(), Err(DiffInsightError::NoActiveSession)));
        assert!(matches!(tracker.snapshot(), Err(DiffInsightError::NoActiveSession)));
    }

    #[test]
    fn test_refresh_without_session_fails() {
        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        assert!(matches!(tracker.refresh(), Err(DiffInsightError::NoActiveSession)));
    }

    #[test]
    fn test_initialize_starts_empty() {
        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        let session = tracker.initialize().unwrap();
        assert_eq!(session.base_branch, "feature/jwt-auth");
        assert!(session.id.starts_with("session-"));
        assert!(session.id.ends_with("-0123456"));
        assert!(session.working.is_empty());

        let stats = tracker.stats().unwrap();
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.changed_lines, 0);
        assert_eq!(stats.complexity, SessionComplexity::Low);
    }

    #[test]
    fn test_refresh_counts_distinct_files() {
        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        tracker.initialize().unwrap();
        tracker.refresh().unwrap();

        let stats = tracker.stats().unwrap();
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.insertions, 5);
        assert_eq!(stats.deletions, 2);
        assert_eq!(stats.changed_lines, 7);
        assert_eq!(stats.complexity, SessionComplexity::Low);
        assert!(tracker.has_changes().unwrap());
    }

    #[test]
    fn test_has_changes_checks_unpushed_commits() {
        let clean = StaticChangeSource::new("main", "abcdef1");
        let mut tracker = SessionTracker::new(clean.clone(), AnalysisConfig::default());
        tracker.initialize().unwrap();
        tracker.refresh().unwrap();
        assert!(!tracker.has_changes().unwrap());

        let mut tracker =
            SessionTracker::new(clean.with_unpushed_commits(true), AnalysisConfig::default());
        tracker.initialize().unwrap();
        assert!(tracker.has_changes().unwrap());
    }

    #[test]
    fn test_initialize_or_resume() {
        let previous = DevelopmentSession::start(
            "fffffff".to_string(),
            "main".to_string(),
            Utc::now() - Duration::minutes(30),
        );

        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        let resumed = tracker
            .initialize_or_resume(Some(previous.clone()), |s| s.base_branch == "main")
            .unwrap();
        assert_eq!(resumed.id, previous.id);
        assert!(tracker.stats().unwrap().duration_minutes >= 30);

        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        let fresh = tracker
            .initialize_or_resume(Some(previous.clone()), |_| false)
            .unwrap();
        assert_ne!(fresh.id, previous.id);
        assert_eq!(fresh.base_branch, "feature/jwt-auth");
    }

    #[test]
    fn test_duration_in_minutes() {
        let start = Utc::now();
        let session = DevelopmentSession::start("abc1234".into(), "main".into(), start);
        assert_eq!(session.elapsed_minutes(start + Duration::minutes(95)), 95);
        assert_eq!(session.elapsed_minutes(start - Duration::minutes(5)), 0);
    }

    #[test]
    fn test_complexity_tiers() {
        let t = SessionThresholds::default();
        assert_eq!(SessionComplexity::classify(1, 10, false, &t), SessionComplexity::Low);
        assert_eq!(SessionComplexity::classify(6, 10, false, &t), SessionComplexity::Medium);
        assert_eq!(SessionComplexity::classify(1, 101, false, &t), SessionComplexity::Medium);
        assert_eq!(SessionComplexity::classify(11, 10, false, &t), SessionComplexity::High);
        assert_eq!(SessionComplexity::classify(1, 501, false, &t), SessionComplexity::High);
        assert_eq!(SessionComplexity::classify(21, 0, false, &t), SessionComplexity::Critical);
        assert_eq!(SessionComplexity::classify(18, 1200, false, &t), SessionComplexity::Critical);
        assert_eq!(SessionComplexity::classify(1, 1, true, &t), SessionComplexity::Critical);
    }

    #[test]
    fn test_complexity_is_monotonic() {
        let t = SessionThresholds::default();
        for files in 0..30usize {
            for lines in (0..1500u64).step_by(50) {
                let base = SessionComplexity::classify(files, lines, false, &t);
                assert!(SessionComplexity::classify(files + 1, lines, false, &t) >= base);
                assert!(SessionComplexity::classify(files, lines + 50, false, &t) >= base);
            }
        }
    }

    #[test]
    fn test_critical_files() {
        let cases = [
            ("package.json", Some(CriticalFileKind::Manifest)),
            ("backend/Cargo.toml", Some(CriticalFileKind::Manifest)),
            (".env.production", Some(CriticalFileKind::Environment)),
            ("db/migrations/001_init.sql", Some(CriticalFileKind::Migration)),
            ("Dockerfile", Some(CriticalFileKind::Infrastructure)),
            (".github/workflows/ci.yml", Some(CriticalFileKind::Infrastructure)),
            ("infra/main.tf", Some(CriticalFileKind::Infrastructure)),
            ("src/lib.rs", None),
        ];
        for (path, expected) in cases {
            assert_eq!(critical_file_kind(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn test_structural_removal_is_critical() {
        let diff = "diff --git a/src/api.ts b/src/api.ts
--- a/src/api.ts
+++ b/src/api.ts
@@ -1,1 +1,0 @@
-export function legacy() {}
";
        let source = StaticChangeSource::new("main", "abcdef1")
            .with_working(RawDiff::new("0\t1\tsrc/api.ts\n", diff));
        let mut tracker = SessionTracker::new(source, AnalysisConfig::default());
        tracker.initialize().unwrap();
        tracker.refresh().unwrap();
        assert_eq!(tracker.stats().unwrap().complexity, SessionComplexity::Critical);
    }

    #[test]
    fn test_total_files_is_union() {
        let mut session = DevelopmentSession::start("abc".into(), "main".into(), Utc::now());
        session.working = vec![change("a.rs", 1, 0), change("b.rs", 1, 0)];
        session.staged = vec![change("b.rs", 2, 0), change("c.rs", 1, 1)];
        let stats = SessionStats::compute(&session, &SessionThresholds::default(), Utc::now());
        assert_eq!(stats.total_files, 3);
        assert_eq!(stats.insertions, 5);
        assert_eq!(session.distinct_changes().len(), 3);
        assert_eq!(session.change_count(), 4);
    }

    #[test]
    fn test_snapshot_bundles_projections() {
        let mut tracker = SessionTracker::new(source(), AnalysisConfig::default());
        tracker.initialize().unwrap();
        tracker.refresh().unwrap();
        let snapshot = tracker.snapshot().unwrap();
        assert_eq!(snapshot.stats, tracker.stats_at(Utc::now()).unwrap());
        assert_eq!(snapshot.session.staged.len(), 2);
    }

    #[test]
    fn test_initialize_rejects_malformed_commit() {
        let source = StaticChangeSource::new("main", "not-a-commit");
        let mut tracker = SessionTracker::new(source, AnalysisConfig::default());
        assert!(matches!(
            tracker.initialize(),
            Err(DiffInsightError::InvalidCommitHash(_))
        ));
        assert!(matches!(tracker.session(), Err(DiffInsightError::NoActiveSession)));
    }

    #[test]
    fn test_staged_removal_survives_working_edit_of_same_file() {
        let staged = "diff --git a/src/auth.ts b/src/auth.ts
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -1,1 +1,0 @@
-export function login(user) {
";
        let working = "diff --git a/src/auth.ts b/src/auth.ts
--- a/src/auth.ts
+++ b/src/auth.ts
@@ -3,1 +3,1 @@
-const ttl = 60;
+const ttl = 120;
";
        let source = StaticChangeSource::new("main", "0123456789abcdef")
            .with_staged(RawDiff::new("0\t1\tsrc/auth.ts\n", staged))
            .with_working(RawDiff::new("1\t1\tsrc/auth.ts\n", working));
        let mut tracker = SessionTracker::new(source, AnalysisConfig::default());
        tracker.initialize().unwrap();
        tracker.refresh().unwrap();

        let merged = tracker.session().unwrap().distinct_changes();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].insertions, 1);
        assert_eq!(merged[0].deletions, 2);
        assert_eq!(merged[0].hunks.len(), 2);

        assert_eq!(tracker.stats().unwrap().complexity, SessionComplexity::Critical);
        let risk = tracker.risk().unwrap();
        assert!(risk.factors.iter().any(|f| {
            f.risk_type == crate::analyzer::RiskType::Breaking
                && f.impact == crate::analyzer::Impact::High
        }));
    }
}
