//! Model Module - flow classifier capability
//!
//! The watcher only sees the [`Classifier`] trait. Artifacts are loaded once at
//! startup; a load failure disables scoring instead of stopping the run.

pub mod linear;

use std::path::Path;

use crate::batch::FeatureBatch;
use crate::error::{ModelLoadError, ScoringError};

pub use linear::LinearModel;

/// Predicts one label per feature row
pub trait Classifier: Send + Sync {
    fn predict(&self, batch: &FeatureBatch) -> Result<Vec<String>, ScoringError>;

    /// Name reported in logs
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Load a classifier artifact from disk
pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ModelLoadError> {
    tracing::info!("Loading classifier from: {}", path.display());

    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    let model = LinearModel::from_path(path)?;
    tracing::info!(
        features = model.features.len(),
        threshold = model.threshold,
        "Classifier loaded successfully"
    );
    Ok(Box::new(model))
}

/// Load the configured classifier, logging and disabling scoring on failure
pub fn load_optional(path: Option<&Path>) -> Option<Box<dyn Classifier>> {
    let path = path?;
    match load_classifier(path) {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::error!("Could not load classifier {}: {} (scoring disabled)", path.display(), e);
            None
        }
    }
}
