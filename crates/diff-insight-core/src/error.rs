use thiserror::Error;

/// diff-insight 的错误类型定义
#[derive(Error, Debug)]
pub enum DiffInsightError {
    #[error("Git repository error: {0}")]
    GitError(String),

    #[error("Diff parsing error: {0}")]
    ParseError(String),

    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid commit hash: {0}")]
    InvalidCommitHash(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Tree-sitter parsing failed: {0}")]
    TreeSitterError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No active session: call initialize() before reading session state")]
    NoActiveSession,
}

/// 项目通用的 Result 类型别名
pub type Result<T> = std::result::Result<T, DiffInsightError>;
