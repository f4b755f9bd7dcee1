//! diff-insight - 工作区变更分析与风险评估工具
//!
//! 把核心库接到真实的 Git 工作区上，并以文本或 JSON 输出结果。

mod cli;
mod render;

use cli::{Cli, CliError, Command, Config, OutputFormatArg};
use diff_insight_core::{
    BatchQualityScorer, ChangeSource, GitChangeSource, QualityScorer, SemanticAnalyzer,
    SessionTracker,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("{}", e);
        std::process::exit(1);
    }

    let config: Config = cli.into();
    debug!(
        "Configuration: repo_path={}, format={:?}",
        config.repo_path.display(),
        config.format
    );

    match run(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            error!("Application error: {}", e);
            std::process::exit(1);
        }
    }
}

/// 默认只输出警告，`--verbose` 提升到 info，`RUST_LOG` 优先
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: Config) -> Result<String, CliError> {
    config.analysis.validate()?;

    match config.command.clone() {
        Command::Session => run_session(&config),
        Command::Analyze { staged } => run_analyze(&config, staged),
        Command::Quality { files, jobs } => run_quality(&config, &files, jobs),
    }
}

fn run_session(config: &Config) -> Result<String, CliError> {
    info!("Tracking session in {}", config.repo_path.display());
    let source = GitChangeSource::new(config.repo_path.clone())?;
    let mut tracker = SessionTracker::new(source, config.analysis.clone());
    tracker.initialize()?;
    tracker.refresh()?;

    if !tracker.has_changes()? {
        info!("No local changes or unpushed commits");
    }

    let snapshot = tracker.snapshot()?;
    render_as(config.format, &snapshot, render::session_text)
}

fn run_analyze(config: &Config, staged: bool) -> Result<String, CliError> {
    let source = GitChangeSource::new(config.repo_path.clone())?;
    let raw = if staged {
        source.staged_changes()?
    } else {
        source.working_changes()?
    };
    let changes = raw.parse();
    info!("Analyzing {} changed files", changes.len());

    let analysis = SemanticAnalyzer::new().analyze(&changes);
    render_as(config.format, &analysis, render::analysis_text)
}

fn run_quality(config: &Config, files: &[PathBuf], jobs: Option<u16>) -> Result<String, CliError> {
    let scorer = QualityScorer::new(config.analysis.quality.clone());
    let mut batch = BatchQualityScorer::new();
    if let Some(jobs) = jobs {
        batch = batch.with_thread_pool_size(usize::from(jobs));
    }

    let result = batch.score_files(&scorer, files)?;
    for (path, e) in &result.failed {
        warn!("Skipped {}: {}", path.display(), e);
    }
    if result.reports.is_empty() {
        return Err(CliError::NothingScored(files.len()));
    }

    render_as(config.format, &result.reports, |reports| {
        render::quality_text(reports)
    })
}

fn render_as<T, F>(format: OutputFormatArg, value: &T, text: F) -> Result<String, CliError>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormatArg::Text => Ok(text(value)),
        OutputFormatArg::Json => {
            let mut json = serde_json::to_string_pretty(value)?;
            json.push('\n');
            Ok(json)
        }
    }
}
