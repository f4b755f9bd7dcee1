//! 命令行接口模块
//!
//! 提供命令行参数解析、参数校验和运行配置

use clap::{Parser, Subcommand, ValueEnum};
use diff_insight_core::{AnalysisConfig, DiffInsightError};
use std::path::PathBuf;
use thiserror::Error;

/// diff-insight - 工作区变更分析与风险评估工具
#[derive(Parser, Debug)]
#[command(name = "diff-insight")]
#[command(author = "diff-insight contributors")]
#[command(version = "0.1.0")]
#[command(about = "Analyze working-tree changes, session risk and file quality")]
#[command(
    long_about = "diff-insight inspects uncommitted changes in a Git working tree, classifies their intent, aggregates them into a development session with a risk level and detected workflow patterns, and scores individual files across six quality dimensions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 仓库路径
    #[arg(
        short = 'r',
        long = "repo",
        default_value = ".",
        global = true,
        env = "DIFF_INSIGHT_REPO",
        help = "Path to the Git repository",
        value_name = "PATH"
    )]
    pub repo_path: PathBuf,

    /// 输出格式
    #[arg(
        short = 'f',
        long = "format",
        value_enum,
        global = true,
        default_value_t = OutputFormatArg::Text,
        help = "Output format for the results"
    )]
    pub format: OutputFormatArg,

    /// 详细输出
    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Enable verbose logging output"
    )]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// 以当前提交为基准建立会话，输出统计、风险与开发模式
    #[command(about = "Summarize the current development session and its risk")]
    Session,

    /// 对工作区或暂存区变更做语义分析
    #[command(about = "Classify working-tree (or staged) changes")]
    Analyze {
        #[arg(long = "staged", help = "Analyze staged changes instead of the working tree")]
        staged: bool,
    },

    /// 对指定文件做六维度质量评分
    #[command(about = "Score files across six quality dimensions")]
    Quality {
        #[arg(required = true, value_name = "FILES", help = "Files to score")]
        files: Vec<PathBuf>,

        #[arg(
            short = 'j',
            long = "jobs",
            value_name = "N",
            help = "Number of worker threads (defaults to the CPU count)",
            value_parser = clap::value_parser!(u16).range(1..=256)
        )]
        jobs: Option<u16>,
    },
}

/// 输出格式命令行参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    /// 纯文本
    #[value(name = "text")]
    Text,
    /// JSON
    #[value(name = "json")]
    Json,
}

/// 应用程序配置
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub repo_path: PathBuf,
    pub format: OutputFormatArg,
    pub verbose: bool,
    pub analysis: AnalysisConfig,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Self {
        Config {
            command: cli.command,
            repo_path: cli.repo_path,
            format: cli.format,
            verbose: cli.verbose,
            analysis: AnalysisConfig::default(),
        }
    }
}

/// CLI 层错误
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] DiffInsightError),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("None of the {0} requested files could be scored")]
    NothingScored(usize),
}

impl Cli {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 验证参数的有效性
    pub fn validate(&self) -> Result<(), CliError> {
        match &self.command {
            Command::Session | Command::Analyze { .. } => {
                if !self.repo_path.exists() {
                    return Err(CliError::InvalidArguments(format!(
                        "Repository path does not exist: {}",
                        self.repo_path.display()
                    )));
                }
            }
            Command::Quality { files, .. } => {
                if let Some(dir) = files.iter().find(|f| f.is_dir()) {
                    return Err(CliError::InvalidArguments(format!(
                        "Expected a file but got a directory: {}",
                        dir.display()
                    )));
                }
            }
        }
        Ok(())
    }
}
