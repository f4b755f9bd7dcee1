//! 批量质量评分
//!
//! 使用 rayon 线程池并发评估多个文件，单个文件失败不会中断整批处理

use crate::error::{DiffInsightError, Result};
use crate::quality::{FileQualityReport, QualityScorer};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 并发质量评分器
///
/// 只持有调度参数；评分规则来自调用方传入的 [`QualityScorer`]
#[derive(Debug, Clone)]
pub struct BatchQualityScorer {
    thread_pool_size: usize,
    batch_size: usize,
}

/// 一批文件的评分结果
#[derive(Debug)]
pub struct BatchResult {
    /// 与输入顺序一致
    pub reports: Vec<FileQualityReport>,
    pub failed: Vec<(PathBuf, DiffInsightError)>,
    pub stats: PerformanceStats,
}

impl BatchResult {
    /// 把报告写入评分器历史，回填趋势
    pub fn record_trends(&mut self, scorer: &mut QualityScorer) {
        for report in &mut self.reports {
            scorer.record(report);
        }
    }
}

/// 批处理统计
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceStats {
    pub total_duration: Duration,
    pub files_processed: u64,
    pub successful_files: u64,
    pub failed_files: u64,
    pub avg_file_processing_time: Duration,
    /// 成功读取并评分的源码字节数
    pub bytes_scored: u64,
}

/// 线程安全的计数器集合
#[derive(Debug)]
pub struct PerformanceMonitor {
    start_time: Instant,
    files_processed: AtomicU64,
    error_count: AtomicU64,
    processing_nanos: AtomicU64,
    bytes_scored: AtomicU64,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            files_processed: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            processing_nanos: AtomicU64::new(0),
            bytes_scored: AtomicU64::new(0),
        }
    }

    pub fn record_file_processed(&self, processing_time: Duration, bytes: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        let nanos = u64::try_from(processing_time.as_nanos()).unwrap_or(u64::MAX);
        self.processing_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.bytes_scored.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> PerformanceStats {
        let files_processed = self.files_processed.load(Ordering::Relaxed);
        let failed_files = self.error_count.load(Ordering::Relaxed);
        let total_nanos = self.processing_nanos.load(Ordering::Relaxed);

        let avg_file_processing_time = if files_processed > 0 {
            Duration::from_nanos(total_nanos / files_processed)
        } else {
            Duration::ZERO
        };

        PerformanceStats {
            total_duration: self.start_time.elapsed(),
            files_processed,
            successful_files: files_processed.saturating_sub(failed_files),
            failed_files,
            avg_file_processing_time,
            bytes_scored: self.bytes_scored.load(Ordering::Relaxed),
        }
    }
}

impl Default for BatchQualityScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchQualityScorer {
    /// 线程数默认为 CPU 核数
    pub fn new() -> Self {
        Self {
            thread_pool_size: num_cpus::get(),
            batch_size: 10,
        }
    }

    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = size.max(1);
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 从磁盘读取并评分，读取失败的文件进入 `failed`
    pub fn score_files(&self, scorer: &QualityScorer, paths: &[PathBuf]) -> Result<BatchResult> {
        info!("Scoring {} files", paths.len());
        self.run(paths, |path| path.as_path(), |path| {
            let source = std::fs::read_to_string(path).map_err(|e| {
                DiffInsightError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read file {}: {e}", path.display()),
                ))
            })?;
            Ok((scorer.evaluate(path, &source), source.len() as u64))
        })
    }

    /// 评分已在内存中的源码
    pub fn score_sources(
        &self,
        scorer: &QualityScorer,
        sources: &[(PathBuf, String)],
    ) -> Result<BatchResult> {
        self.run(sources, |(path, _)| path.as_path(), |(path, source)| {
            Ok((scorer.evaluate(path, source), source.len() as u64))
        })
    }

    fn run<T, P, F>(&self, items: &[T], path_of: P, score: F) -> Result<BatchResult>
    where
        T: Sync,
        P: Fn(&T) -> &Path + Sync,
        F: Fn(&T) -> Result<(FileQualityReport, u64)> + Sync,
    {
        let monitor = PerformanceMonitor::new();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_pool_size)
            .build()
            .map_err(|e| {
                DiffInsightError::ConfigError(format!("Failed to create thread pool: {e}"))
            })?;

        let results: Vec<_> = pool.install(|| {
            items
                .par_chunks(self.batch_size)
                .flat_map(|chunk| {
                    chunk.par_iter().map(|item| {
                        let path = path_of(item);
                        let started = Instant::now();
                        let outcome = score(item);
                        let elapsed = started.elapsed();

                        match outcome {
                            Ok((report, bytes)) => {
                                monitor.record_file_processed(elapsed, bytes);
                                debug!("Scored {:?} in {:?}", path, elapsed);
                                Ok(report)
                            }
                            Err(error) => {
                                monitor.record_file_processed(elapsed, 0);
                                monitor.record_error();
                                warn!("Failed to score {:?}: {}", path, error);
                                Err((path.to_path_buf(), error))
                            }
                        }
                    })
                })
                .collect()
        });

        let mut reports = Vec::new();
        let mut failed = Vec::new();
        for result in results {
            match result {
                Ok(report) => reports.push(report),
                Err(failure) => failed.push(failure),
            }
        }

        let stats = monitor.get_stats();
        info!(
            "Batch scoring finished: {} succeeded, {} failed, took {:?}",
            reports.len(),
            failed.len(),
            stats.total_duration
        );

        Ok(BatchResult {
            reports,
            failed,
            stats,
        })
    }
}
