//! Batch extraction pipeline.
//!
//! Reads and extracts many files in parallel on a dedicated rayon pool.
//! The pool has as many workers as each grammar's parser pool has parsers,
//! so a full worker set never waits on a parser loan for a single grammar.
//!
//! Failures are per file: a file that cannot be read or extracted is
//! recorded in the report and the batch carries on.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::extractor::Extractor;
use crate::parser::ParserManager;
use crate::query::QueryManager;
use crate::types::PerFileResult;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Aggregate counts for one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    /// Files extracted successfully.
    pub files: usize,
    pub symbols: usize,
    pub imports: usize,
    pub exports: usize,
    pub failures: usize,
    /// Files skipped for exceeding the size limit.
    pub skipped: usize,
    pub parsers_created: usize,
    pub parses_called: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// A file the batch could not extract.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub error: String,
}

/// Everything produced by a batch run, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<PerFileResult>,
    pub failures: Vec<FileFailure>,
    pub skipped: Vec<PathBuf>,
    pub stats: BatchStats,
}

enum Outcome {
    Extracted(PerFileResult),
    Skipped(PathBuf),
    Failed(FileFailure),
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Owns the shared parser and query managers for a batch session.
pub struct Pipeline {
    extractor: Extractor,
    workers: rayon::ThreadPool,
    max_file_size: u64,
}

impl Pipeline {
    /// Build a pipeline whose parser pools and worker pool share one size.
    pub fn new(config: &Config) -> Result<Self> {
        let size = config.effective_pool_size();
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("glean-worker-{i}"))
            .build()
            .context("failed to build extraction worker pool")?;
        let extractor = Extractor::new(
            Arc::new(ParserManager::new(size)),
            Arc::new(QueryManager::new()),
        )
        .with_type_priority(config.type_priority());
        debug!(workers = size, "pipeline ready");

        Ok(Self {
            extractor,
            workers,
            max_file_size: config.max_file_size(),
        })
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    pub fn workers(&self) -> usize {
        self.workers.current_num_threads()
    }

    /// Extract every path in parallel.
    pub fn extract_paths(&self, paths: &[PathBuf]) -> BatchReport {
        let start = Instant::now();
        let outcomes: Vec<Outcome> = self
            .workers
            .install(|| paths.par_iter().map(|p| self.extract_one(p)).collect());

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Extracted(result) => {
                    report.stats.symbols += result.symbols.len();
                    report.stats.imports += result.imports.len();
                    report.stats.exports += result.exports.len();
                    report.results.push(result);
                }
                Outcome::Skipped(path) => report.skipped.push(path),
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }

        let parser_stats = self.extractor.parsers().stats();
        report.stats.files = report.results.len();
        report.stats.failures = report.failures.len();
        report.stats.skipped = report.skipped.len();
        report.stats.parsers_created = parser_stats.parsers_created;
        report.stats.parses_called = parser_stats.parses_called;
        report.stats.elapsed = start.elapsed();
        report
    }

    fn extract_one(&self, path: &Path) -> Outcome {
        let failed = |error: String| {
            Outcome::Failed(FileFailure {
                path: path.display().to_string(),
                error,
            })
        };

        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > self.max_file_size => {
                debug!(path = %path.display(), bytes = meta.len(), "skipping large file");
                return Outcome::Skipped(path.to_path_buf());
            }
            Ok(_) => {}
            Err(e) => return failed(format!("failed to read: {e}")),
        }
        let source = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => return failed(format!("failed to read: {e}")),
        };
        match self.extractor.extract_file(path, &source) {
            Ok(result) => Outcome::Extracted(result),
            Err(e) => failed(e.to_string()),
        }
    }

    /// Release every parser and compiled query. Call once, after the last
    /// batch.
    pub fn close(self) {
        self.extractor.queries().close();
        self.extractor.parsers().close();
    }
}

/// One-shot batch: build a pipeline from `config`, run it, close it.
pub fn extract_paths(paths: &[PathBuf], config: &Config) -> Result<BatchReport> {
    let pipeline = Pipeline::new(config)?;
    let report = pipeline.extract_paths(paths);
    pipeline.close();
    Ok(report)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
