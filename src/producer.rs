//! Batch Producer - replays a flow dataset as timed batch files
//!
//! The filtered source is read in full before anything is written, so a bad
//! row aborts the run with an empty watch directory. Rows are then cut into
//! contiguous chunks, each written under a hidden staging name and renamed
//! into place, so a watcher never sees a partially written batch.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::batch::FlowBatch;
use crate::error::{BatchError, ProducerError};
use crate::naming::{batch_file_name, staging_file_name};
use crate::schema::{self, FEATURE_COLUMNS};

/// Headers echoed back in a schema mismatch
const MAX_REPORTED_HEADERS: usize = 25;

/// Producer settings
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub rows_per_batch: usize,
    pub interval: Duration,
    pub include_extra: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            rows_per_batch: 200,
            interval: Duration::from_secs(1),
            include_extra: true,
        }
    }
}

/// One written batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchManifest {
    pub sequence: u64,
    /// Source row range `[start, end)` after filtering
    pub start_row: usize,
    pub end_row: usize,
    pub path: PathBuf,
}

impl BatchManifest {
    pub fn rows(&self) -> usize {
        self.end_row - self.start_row
    }
}

/// Summary of a producer run
#[derive(Debug, Clone, Default)]
pub struct StreamReport {
    pub batches: Vec<BatchManifest>,
    pub total_rows: usize,
    pub columns: Vec<String>,
    /// Stopped early by cancellation
    pub cancelled: bool,
}

/// Stream `source` into `destination` as numbered batch files
pub async fn simulate_stream(
    source: &Path,
    destination: &Path,
    rows_per_batch: usize,
    interval: Duration,
    include_extra: bool,
) -> Result<StreamReport, ProducerError> {
    let options = StreamOptions {
        rows_per_batch,
        interval,
        include_extra,
    };
    simulate_stream_until(source, destination, &options, &CancellationToken::new()).await
}

/// [`simulate_stream`] that stops between batches once `cancel` fires
pub async fn simulate_stream_until(
    source: &Path,
    destination: &Path,
    options: &StreamOptions,
    cancel: &CancellationToken,
) -> Result<StreamReport, ProducerError> {
    if options.rows_per_batch == 0 {
        return Err(ProducerError::InvalidBatchSize);
    }

    let source_err = |e: csv::Error| ProducerError::Source {
        path: source.to_path_buf(),
        source: e,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(source)
        .map_err(source_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(source_err)?
        .iter()
        .map(schema::normalize_header)
        .collect();

    // Extras alone are not a flow dataset
    if schema::select_features(&headers).is_empty() {
        return Err(ProducerError::SchemaMismatch {
            expected: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            found: headers.into_iter().take(MAX_REPORTED_HEADERS).collect(),
        });
    }
    let keep = schema::producer_columns(&headers, options.include_extra);
    let indices: Vec<usize> = keep
        .iter()
        .filter_map(|c| headers.iter().position(|h| h == c))
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(source_err)?;
        rows.push(
            indices
                .iter()
                .map(|&i| record.get(i).unwrap_or_default().to_string())
                .collect::<Vec<String>>(),
        );
    }

    fs::create_dir_all(destination)?;

    tracing::info!(
        "[START] Streaming {} rows of {} into {} in chunks of {} every {:?}",
        rows.len(),
        source.display(),
        destination.display(),
        options.rows_per_batch,
        options.interval
    );

    let columns: Vec<String> = keep.iter().map(|c| c.to_string()).collect();
    let mut report = StreamReport {
        columns: columns.clone(),
        ..Default::default()
    };

    let mut remaining = rows.into_iter().peekable();
    while remaining.peek().is_some() {
        let mut chunk = FlowBatch::new(columns.clone());
        for row in remaining.by_ref().take(options.rows_per_batch) {
            chunk.push_row(row);
        }
        if !emit_batch(&mut report, chunk, destination, options, cancel).await? {
            return Ok(report);
        }
    }

    tracing::info!(
        batches = report.batches.len(),
        rows = report.total_rows,
        "[DONE] All rows streamed."
    );
    Ok(report)
}

/// Wait out the cadence, then publish one batch. Returns `false` when cancelled.
async fn emit_batch(
    report: &mut StreamReport,
    chunk: FlowBatch,
    destination: &Path,
    options: &StreamOptions,
    cancel: &CancellationToken,
) -> Result<bool, ProducerError> {
    if !report.batches.is_empty() {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
    if cancel.is_cancelled() {
        tracing::info!(batches = report.batches.len(), "[STOP] Producer cancelled");
        report.cancelled = true;
        return Ok(false);
    }

    let sequence = report.batches.len() as u64;
    let start_row = report.total_rows;
    let end_row = start_row + chunk.len();
    let path = write_batch_atomic(destination, sequence, &chunk)?;

    tracing::info!(
        sequence,
        "[BATCH] Wrote rows {}:{} -> {}",
        start_row,
        end_row,
        batch_file_name(sequence)
    );

    report.total_rows = end_row;
    report.batches.push(BatchManifest {
        sequence,
        start_row,
        end_row,
        path,
    });
    Ok(true)
}

/// Write to a staging file in the same directory, then rename into the watched name.
/// On failure the staging file is removed.
pub fn write_batch_atomic(
    destination: &Path,
    sequence: u64,
    chunk: &FlowBatch,
) -> Result<PathBuf, ProducerError> {
    let staging = destination.join(staging_file_name(sequence));
    let target = destination.join(batch_file_name(sequence));

    let written = write_staging(&staging, chunk)
        .and_then(|()| fs::rename(&staging, &target).map_err(BatchError::from));
    if let Err(source) = written {
        if let Err(e) = fs::remove_file(&staging) {
            tracing::debug!("Could not remove {}: {}", staging.display(), e);
        }
        return Err(ProducerError::Write {
            path: target,
            source,
        });
    }
    Ok(target)
}

fn write_staging(staging: &Path, chunk: &FlowBatch) -> Result<(), BatchError> {
    let mut writer = BufWriter::new(File::create(staging)?);
    chunk.write_csv(&mut writer, true)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::parse_sequence;

    fn write_source(dir: &Path, rows: usize) -> PathBuf {
        let path = dir.join("source.csv");
        let mut text = String::from(" Flow Duration, Total Fwd Packets,Unused, Label\n");
        for i in 0..rows {
            text.push_str(&format!("{i},{},{},BENIGN\n", i * 2, i * 3));
        }
        fs::write(&path, text).unwrap();
        path
    }

    fn options(rows_per_batch: usize) -> StreamOptions {
        StreamOptions {
            rows_per_batch,
            interval: Duration::ZERO,
            include_extra: true,
        }
    }

    fn batch_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_partition_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 450);
        let out = dir.path().join("out");

        let report = simulate_stream(&source, &out, 200, Duration::ZERO, true)
            .await
            .unwrap();

        let sizes: Vec<usize> = report.batches.iter().map(BatchManifest::rows).collect();
        assert_eq!(sizes, vec![200, 200, 50]);
        assert_eq!(report.total_rows, 450);
        assert!(!report.cancelled);

        // Concatenation in sequence order reproduces the source order
        let names = batch_files(&out);
        assert_eq!(
            names,
            vec!["flows_batch_000000.csv", "flows_batch_000001.csv", "flows_batch_000002.csv"]
        );
        let mut durations = Vec::new();
        for name in &names {
            let batch = FlowBatch::read_path(&out.join(name)).unwrap();
            assert_eq!(batch.headers(), &["Flow Duration", "Total Fwd Packets", "Label"]);
            durations.extend(batch.records().map(|r| r.get("Flow Duration").unwrap().to_string()));
        }
        let expected: Vec<String> = (0..450).map(|i| i.to_string()).collect();
        assert_eq!(durations, expected);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_empty_tail() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 400);
        let out = dir.path().join("out");

        let report = simulate_stream_until(&source, &out, &options(200), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.batches.len(), 2);
        assert_eq!(batch_files(&out).len(), 2);
    }

    #[tokio::test]
    async fn test_exclude_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 3);
        let out = dir.path().join("out");

        let report = simulate_stream(&source, &out, 10, Duration::ZERO, false)
            .await
            .unwrap();
        assert_eq!(report.columns, vec!["Flow Duration", "Total Fwd Packets"]);
    }

    #[tokio::test]
    async fn test_schema_mismatch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.csv");
        fs::write(&source, "foo,bar\n1,2\n").unwrap();
        let out = dir.path().join("out");

        let result = simulate_stream(&source, &out, 10, Duration::ZERO, true).await;
        match result {
            Err(ProducerError::SchemaMismatch { expected, found }) => {
                assert_eq!(expected.len(), 18);
                assert_eq!(found, vec!["foo", "bar"]);
            }
            other => panic!("Expected SchemaMismatch, got {:?}", other),
        }
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_extra_columns_alone_are_a_schema_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.csv");
        fs::write(&source, "Timestamp, Label,Other\n1,BENIGN,x\n2,DDoS,y\n").unwrap();
        let out = dir.path().join("out");

        let result = simulate_stream(&source, &out, 10, Duration::ZERO, true).await;
        assert!(matches!(result, Err(ProducerError::SchemaMismatch { .. })));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_malformed_row_past_first_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 250);
        let mut text = fs::read_to_string(&source).unwrap();
        text.push_str("ragged\n");
        fs::write(&source, text).unwrap();
        let out = dir.path().join("out");

        let result = simulate_stream(&source, &out, 200, Duration::ZERO, true).await;
        assert!(matches!(result, Err(ProducerError::Source { .. })));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_zero_batch_size_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 3);
        let result = simulate_stream(&source, dir.path(), 0, Duration::ZERO, true).await;
        assert!(matches!(result, Err(ProducerError::InvalidBatchSize)));
    }

    #[tokio::test]
    async fn test_cancel_stops_between_batches() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), 50);
        let out = dir.path().join("out");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = simulate_stream_until(&source, &out, &options(10), &cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert!(report.batches.is_empty());
        assert!(batch_files(&out).is_empty());
    }

    #[test]
    fn test_atomic_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut chunk = FlowBatch::new(vec!["Flow Duration".into()]);
        chunk.push_row(vec!["1".into()]);

        let path = write_batch_atomic(dir.path(), 7, &chunk).unwrap();
        assert_eq!(parse_sequence(path.file_name().unwrap().to_str().unwrap()), Some(7));
        assert_eq!(batch_files(dir.path()), vec!["flows_batch_000007.csv"]);
    }

    #[test]
    fn test_failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory squatting on the batch name makes the rename fail
        let blocker = dir.path().join(batch_file_name(3));
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), "x").unwrap();

        let mut chunk = FlowBatch::new(vec!["Flow Duration".into()]);
        chunk.push_row(vec!["1".into()]);

        let result = write_batch_atomic(dir.path(), 3, &chunk);
        assert!(matches!(result, Err(ProducerError::Write { .. })));
        assert_eq!(batch_files(dir.path()), vec!["flows_batch_000003.csv"]);
        assert!(!dir.path().join(staging_file_name(3)).exists());
    }
}
