//! Batch file naming contract shared by producer and watcher

use once_cell::sync::Lazy;
use regex::Regex;

/// File name prefix for every batch
pub const BATCH_PREFIX: &str = "flows_batch_";

/// Batch file extension
pub const BATCH_EXTENSION: &str = "csv";

static BATCH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^flows_batch_(\d{6,})\.csv$").expect("batch name pattern is valid")
});

/// `flows_batch_000042.csv`
pub fn batch_file_name(sequence: u64) -> String {
    format!("{BATCH_PREFIX}{sequence:06}.{BATCH_EXTENSION}")
}

/// Hidden staging name used while a batch is being written.
///
/// Never matches [`parse_sequence`], so the watcher cannot pick up a partial file.
pub fn staging_file_name(sequence: u64) -> String {
    format!(".{}.tmp", batch_file_name(sequence))
}

/// Sequence number embedded in a batch file name, if the name follows the contract
pub fn parse_sequence(file_name: &str) -> Option<u64> {
    BATCH_NAME
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
