//! Linear Model - logistic classifier over named flow features

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::Classifier;
use crate::batch::FeatureBatch;
use crate::error::{ModelLoadError, ScoringError};

/// JSON artifact: `sigmoid(weights . x + bias) > threshold` selects the positive label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub features: Vec<String>,
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub positive_label: String,
    #[serde(default = "default_negative_label")]
    pub negative_label: String,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_negative_label() -> String {
    crate::schema::BENIGN_LABEL.to_string()
}

impl LinearModel {
    pub fn from_path(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path)?;
        let model: Self = serde_json::from_str(&raw)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ModelLoadError> {
        if self.features.is_empty() {
            return Err(ModelLoadError::Invalid("model has no features".to_string()));
        }
        if self.features.len() != self.weights.len() {
            return Err(ModelLoadError::Invalid(format!(
                "{} features but {} weights",
                self.features.len(),
                self.weights.len()
            )));
        }
        Ok(())
    }

    /// Probability of the positive label for one row.
    ///
    /// `indices[k]` is the batch column of `features[k]`, `None` when the batch lacks it.
    pub fn score_row(&self, row: &[f64], indices: &[Option<usize>]) -> f64 {
        let z = indices
            .iter()
            .zip(&self.weights)
            .map(|(i, w)| {
                let x = i.and_then(|i| row.get(i).copied()).unwrap_or(0.0);
                // NaN/inf cells are imputed
                if x.is_finite() { x * w } else { 0.0 }
            })
            .sum::<f64>()
            + self.bias;
        1.0 / (1.0 + (-z).exp())
    }
}

impl Classifier for LinearModel {
    fn predict(&self, batch: &FeatureBatch) -> Result<Vec<String>, ScoringError> {
        let indices: Vec<Option<usize>> =
            self.features.iter().map(|f| batch.column_index(f)).collect();
        if indices.iter().all(Option::is_none) {
            return Err(ScoringError::Model(format!(
                "batch carries none of the {} model features",
                self.features.len()
            )));
        }

        Ok(batch
            .rows
            .iter()
            .map(|row| {
                if self.score_row(row, &indices) > self.threshold {
                    self.positive_label.clone()
                } else {
                    self.negative_label.clone()
                }
            })
            .collect())
    }

    fn name(&self) -> &str {
        "linear"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> LinearModel {
        LinearModel {
            features: vec!["SYN Flag Count".into()],
            weights: vec![2.0],
            bias: -5.0,
            threshold: 0.5,
            positive_label: "PortScan".into(),
            negative_label: "BENIGN".into(),
        }
    }

    fn batch(values: &[f64]) -> FeatureBatch {
        FeatureBatch {
            columns: vec!["Flow Duration".into(), "SYN Flag Count".into()],
            rows: values.iter().map(|v| vec![1.0, *v]).collect(),
        }
    }

    #[test]
    fn test_predict_thresholds_by_column_name() {
        let labels = model().predict(&batch(&[0.0, 10.0])).unwrap();
        assert_eq!(labels, vec!["BENIGN", "PortScan"]);
    }

    #[test]
    fn test_nan_features_are_imputed() {
        let labels = model().predict(&batch(&[f64::NAN, f64::INFINITY])).unwrap();
        assert_eq!(labels, vec!["BENIGN", "BENIGN"]);
    }

    #[test]
    fn test_absent_features_are_imputed() {
        let mut model = model();
        model.features.push("RST Flag Count".into());
        model.weights.push(100.0);

        let labels = model.predict(&batch(&[10.0])).unwrap();
        assert_eq!(labels, vec!["PortScan"]);
    }

    #[test]
    fn test_no_model_features_is_scoring_error() {
        let batch = FeatureBatch {
            columns: vec!["Flow Duration".into()],
            rows: vec![vec![1.0]],
        };
        assert!(matches!(model().predict(&batch), Err(ScoringError::Model(_))));
    }

    #[test]
    fn test_from_path_rejects_weight_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"features":["Flow Duration","SYN Flag Count"],"weights":[1.0],"positive_label":"DDoS"}"#,
        )
        .unwrap();

        assert!(matches!(LinearModel::from_path(&path), Err(ModelLoadError::Invalid(_))));
    }

    #[test]
    fn test_from_path_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(
            &path,
            r#"{"features":["Flow Duration"],"weights":[0.5],"positive_label":"DDoS"}"#,
        )
        .unwrap();

        let model = LinearModel::from_path(&path).unwrap();
        assert_eq!(model.threshold, 0.5);
        assert_eq!(model.negative_label, "BENIGN");
        assert_eq!(model.bias, 0.0);
    }
}
