//! Directory Watcher - polls for batch files and pushes them downstream
//!
//! Each discovered file moves through
//! `DISCOVERED -> PARSED -> (SCORED | UNSCORED) -> FORWARDED -> ARCHIVED`.
//! Files are handled one at a time in sequence order. Moving a file into the
//! archive directory is its commit point; the in-memory seen-set guards
//! against reprocessing when that move fails.

pub mod results;
pub mod sink;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::batch::FlowBatch;
use crate::error::ScoringError;
use crate::model::Classifier;
use crate::models::GeoDispatchRecord;
use crate::naming::parse_sequence;
use crate::schema::{self, PREDICTION_COLUMN};

pub use results::ResultsWriter;
pub use sink::{BrokerSink, HttpForwarder, RecordSink};

// ============================================================================
// CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub watch_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub poll_interval: Duration,
    pub results_path: PathBuf,
}

impl WatcherConfig {
    /// Defaults: archive under `<watch_dir>/processed`, 500ms ticks, `predictions.csv`
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        let watch_dir = watch_dir.into();
        Self {
            archive_dir: watch_dir.join("processed"),
            watch_dir,
            poll_interval: Duration::from_millis(500),
            results_path: PathBuf::from("predictions.csv"),
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// What happened to one discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Processed and marked seen. `forwarded`/`archived` are best-effort.
    Processed {
        rows: usize,
        scored: bool,
        forwarded: bool,
        archived: bool,
    },
    /// Could not be parsed; left in place for the next tick
    Malformed,
    /// Classifier failed; left in place for the next tick
    ScoringFailed,
}

/// Summary of one poll tick
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub files: Vec<(String, FileOutcome)>,
}

impl TickReport {
    pub fn processed(&self) -> usize {
        self.files
            .iter()
            .filter(|(_, o)| matches!(o, FileOutcome::Processed { .. }))
            .count()
    }

    pub fn retried(&self) -> usize {
        self.files.len() - self.processed()
    }
}

// ============================================================================
// WATCHER
// ============================================================================

pub struct Watcher {
    config: WatcherConfig,
    classifier: Option<Box<dyn Classifier>>,
    results: ResultsWriter,
    sink: Box<dyn RecordSink>,
    seen: HashSet<String>,
}

impl Watcher {
    pub fn new(config: WatcherConfig, sink: Box<dyn RecordSink>) -> Self {
        Self {
            results: ResultsWriter::new(config.results_path.clone()),
            config,
            classifier: None,
            sink,
            seen: HashSet::new(),
        }
    }

    pub fn with_classifier(mut self, classifier: Option<Box<dyn Classifier>>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// File names already processed in this run
    pub fn seen(&self) -> &HashSet<String> {
        &self.seen
    }

    /// Poll until `cancel` fires. A tick in progress finishes its current file first.
    pub async fn run(&mut self, cancel: CancellationToken) -> io::Result<()> {
        fs::create_dir_all(&self.config.watch_dir)?;
        fs::create_dir_all(&self.config.archive_dir)?;

        tracing::info!(
            scoring = self.classifier.as_ref().map(|c| c.name()).unwrap_or("disabled"),
            "[START] watching {} (poll {:?})",
            self.config.watch_dir.display(),
            self.config.poll_interval
        );

        while !cancel.is_cancelled() {
            self.poll_once(&cancel).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(processed = self.seen.len(), "[STOP] watcher exiting");
        Ok(())
    }

    /// One tick: process every unseen batch file in sequence order
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> TickReport {
        let mut report = TickReport::default();

        let pending = match self.discover() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!("Could not list {}: {}", self.config.watch_dir.display(), e);
                return report;
            }
        };

        for (name, path) in pending {
            if cancel.is_cancelled() {
                break;
            }
            let outcome = self.process_file(&name, &path).await;
            report.files.push((name, outcome));
        }
        report
    }

    /// Unseen batch files, ordered by sequence number
    fn discover(&self) -> io::Result<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.config.watch_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(sequence) = parse_sequence(&name) else {
                continue;
            };
            if self.seen.contains(&name) || !entry.path().is_file() {
                continue;
            }
            found.push((sequence, name, entry.path()));
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name, path)| (name, path)).collect())
    }

    async fn process_file(&mut self, name: &str, path: &Path) -> FileOutcome {
        // PARSED
        let batch = match FlowBatch::read_path(path) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(file = name, "Could not parse batch, will retry next tick: {}", e);
                return FileOutcome::Malformed;
            }
        };
        let rows = batch.len();

        let selection = schema::select_features(batch.headers());
        if !selection.is_complete() {
            tracing::warn!(file = name, rows, missing = ?selection.missing, "Missing feature columns");
        }

        // SCORED | UNSCORED
        let (outgoing, scored) = match &self.classifier {
            Some(classifier) if !selection.is_empty() => {
                match score_batch(classifier.as_ref(), batch, &selection.present) {
                    Ok(enriched) => {
                        match self.results.append(&enriched) {
                            Ok(_) => tracing::info!(
                                file = name,
                                rows,
                                "[PRED] -> {}",
                                self.results.path().display()
                            ),
                            Err(e) => tracing::error!(
                                file = name,
                                rows,
                                "Could not append to {}: {}",
                                self.results.path().display(),
                                e
                            ),
                        }
                        (enriched, true)
                    }
                    Err(e) => {
                        tracing::error!(file = name, rows, "Predict failed, will retry next tick: {}", e);
                        return FileOutcome::ScoringFailed;
                    }
                }
            }
            _ => {
                tracing::info!(file = name, rows, "[BATCH] unscored");
                (batch, false)
            }
        };

        // FORWARDED
        let forwarded = self.forward(name, &outgoing).await;

        // ARCHIVED
        self.seen.insert(name.to_string());
        let archived = match archive_file(path, &self.config.archive_dir) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(file = name, rows, "Could not move to archive: {}", e);
                false
            }
        };

        FileOutcome::Processed {
            rows,
            scored,
            forwarded,
            archived,
        }
    }

    /// Best-effort; a failure is logged and never blocks archiving
    async fn forward(&self, name: &str, batch: &FlowBatch) -> bool {
        if batch.is_empty() {
            return true;
        }

        let records: Vec<GeoDispatchRecord> =
            batch.records().map(|r| GeoDispatchRecord::from_record(&r)).collect();
        match self.sink.forward(&records).await {
            Ok(accepted) => {
                tracing::debug!(file = name, accepted, "Forwarded to relay");
                true
            }
            Err(e) => {
                tracing::warn!(file = name, rows = records.len(), "Relay push failed: {}", e);
                false
            }
        }
    }
}

/// Run the classifier and attach its labels as the `prediction` column
fn score_batch(
    classifier: &dyn Classifier,
    mut batch: FlowBatch,
    features: &[&str],
) -> Result<FlowBatch, ScoringError> {
    let matrix = batch.feature_matrix(features);
    let labels = classifier.predict(&matrix)?;
    if labels.len() != batch.len() {
        return Err(ScoringError::LengthMismatch {
            expected: batch.len(),
            got: labels.len(),
        });
    }
    batch.set_column(PREDICTION_COLUMN, labels);
    Ok(batch)
}

/// Move `path` into `archive_dir`, copying across filesystems when rename cannot
pub fn archive_file(path: &Path, archive_dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(archive_dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let target = archive_dir.join(file_name);

    if fs::rename(path, &target).is_err() {
        fs::copy(path, &target)?;
        fs::remove_file(path)?;
    }
    Ok(target)
}
