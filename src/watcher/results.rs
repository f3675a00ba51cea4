use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::batch::FlowBatch;
use crate::error::BatchError;

/// Append-only results table. The header row is written only when the file is created.
#[derive(Debug, Clone)]
pub struct ResultsWriter {
    path: PathBuf,
}

impl ResultsWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append every row of `batch`, returning the row count
    pub fn append(&self, batch: &FlowBatch) -> Result<usize, BatchError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let with_header = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        batch.write_csv(BufWriter::new(file), with_header)?;
        Ok(batch.len())
    }
}
