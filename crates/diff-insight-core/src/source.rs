//! 变更来源模块
//!
//! 定义会话聚合器所依赖的变更来源接口，以及基于 Git 工作区的实现。
//! 核心逻辑只消费已经取回的文本，从不缓存来源数据。

use crate::error::{DiffInsightError, Result};
use crate::git::{DiffParser, FileChange};
use gix::ThreadSafeRepository;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// 一组未解析的差异文本：numstat 输出与对应的统一差异
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawDiff {
    pub numstat: String,
    pub diff: String,
}

impl RawDiff {
    pub fn new(numstat: impl Into<String>, diff: impl Into<String>) -> Self {
        Self {
            numstat: numstat.into(),
            diff: diff.into(),
        }
    }

    /// 解析为文件变更列表
    pub fn parse(&self) -> Vec<FileChange> {
        DiffParser::parse_changes(&self.numstat, &self.diff)
    }

    pub fn is_empty(&self) -> bool {
        self.numstat.trim().is_empty()
    }
}

/// 变更来源接口
///
/// 所有查询结果都可能已过期，调用方每次都应重新查询。
pub trait ChangeSource {
    /// 工作区（未暂存）变更
    fn working_changes(&self) -> Result<RawDiff>;

    /// 已暂存变更
    fn staged_changes(&self) -> Result<RawDiff>;

    /// 当前分支名
    fn current_branch(&self) -> Result<String>;

    /// 当前提交哈希
    fn current_commit(&self) -> Result<String>;

    /// 是否存在尚未推送到远端的提交
    fn has_unpushed_commits(&self) -> Result<bool>;
}

/// 校验提交哈希格式（4-40 位十六进制）
pub fn validate_commit_hash(commit_hash: &str) -> Result<()> {
    if commit_hash.is_empty() {
        return Err(DiffInsightError::InvalidCommitHash(
            "Empty commit hash".to_string(),
        ));
    }

    let hash_len = commit_hash.len();
    if !(4..=40).contains(&hash_len) {
        return Err(DiffInsightError::InvalidCommitHash(format!(
            "Invalid commit hash length: {hash_len}"
        )));
    }

    if !commit_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(DiffInsightError::InvalidCommitHash(format!(
            "Invalid commit hash format: {commit_hash}"
        )));
    }

    Ok(())
}

/// 基于 Git 工作区的变更来源
///
/// 分支与提交信息通过 gix 读取，差异文本通过 git 命令行生成。
pub struct GitChangeSource {
    repo_path: PathBuf,
    repo: ThreadSafeRepository,
}

impl GitChangeSource {
    /// 打开指定路径的仓库
    pub fn new(repo_path: PathBuf) -> Result<Self> {
        let repo = ThreadSafeRepository::open(repo_path.clone()).map_err(|e| {
            DiffInsightError::GitError(format!(
                "Failed to open repository at {}: {}",
                repo_path.display(),
                e
            ))
        })?;

        Ok(Self { repo_path, repo })
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| DiffInsightError::GitError(format!("Failed to run git {args:?}: {e}")))?;

        if !output.status.success() {
            return Err(DiffInsightError::GitError(format!(
                "git {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn collect_diff(&self, staged: bool) -> Result<RawDiff> {
        let mut numstat_args = vec!["diff", "--no-color", "--numstat", "-M"];
        let mut diff_args = vec!["diff", "--no-color", "--no-ext-diff", "-M"];
        if staged {
            numstat_args.push("--cached");
            diff_args.push("--cached");
        }

        let numstat = self.run_git(&numstat_args)?;
        let diff = self.run_git(&diff_args)?;
        debug!(
            "Collected {} diff for {} ({} numstat lines)",
            if staged { "staged" } else { "working" },
            self.repo_path.display(),
            numstat.lines().count()
        );
        Ok(RawDiff { numstat, diff })
    }
}

impl ChangeSource for GitChangeSource {
    fn working_changes(&self) -> Result<RawDiff> {
        self.collect_diff(false)
    }

    fn staged_changes(&self) -> Result<RawDiff> {
        self.collect_diff(true)
    }

    fn current_branch(&self) -> Result<String> {
        let repo = self.repo.to_thread_local();
        let head_name = repo
            .head_name()
            .map_err(|e| DiffInsightError::GitError(format!("Failed to read HEAD: {e}")))?;

        // 分离头指针时没有分支名
        Ok(head_name
            .map(|name| name.shorten().to_string())
            .unwrap_or_else(|| "HEAD".to_string()))
    }

    fn current_commit(&self) -> Result<String> {
        let repo = self.repo.to_thread_local();
        let id = repo
            .head_id()
            .map_err(|e| DiffInsightError::GitError(format!("Failed to resolve HEAD commit: {e}")))?;
        Ok(id.to_string())
    }

    fn has_unpushed_commits(&self) -> Result<bool> {
        match self.run_git(&["rev-list", "--count", "@{u}..HEAD"]) {
            Ok(count) => Ok(count.trim().parse::<u64>().unwrap_or(0) > 0),
            Err(e) => {
                // 没有上游分支时视为没有待推送提交
                debug!("No upstream to compare against: {}", e);
                Ok(false)
            }
        }
    }
}

/// 内存中的变更来源
///
/// 适用于调用方已经持有差异文本的场景，也用于测试。
#[derive(Debug, Clone)]
pub struct StaticChangeSource {
    pub working: RawDiff,
    pub staged: RawDiff,
    pub branch: String,
    pub commit: String,
    pub unpushed_commits: bool,
}

impl StaticChangeSource {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            working: RawDiff::default(),
            staged: RawDiff::default(),
            branch: branch.into(),
            commit: commit.into(),
            unpushed_commits: false,
        }
    }

    pub fn with_working(mut self, working: RawDiff) -> Self {
        self.working = working;
        self
    }

    pub fn with_staged(mut self, staged: RawDiff) -> Self {
        self.staged = staged;
        self
    }

    pub fn with_unpushed_commits(mut self, unpushed: bool) -> Self {
        self.unpushed_commits = unpushed;
        self
    }
}

impl ChangeSource for StaticChangeSource {
    fn working_changes(&self) -> Result<RawDiff> {
        Ok(self.working.clone())
    }

    fn staged_changes(&self) -> Result<RawDiff> {
        Ok(self.staged.clone())
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.branch.clone())
    }

    fn current_commit(&self) -> Result<String> {
        Ok(self.commit.clone())
    }

    fn has_unpushed_commits(&self) -> Result<bool> {
        Ok(self.unpushed_commits)
    }
}
