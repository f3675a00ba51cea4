//! Flow Schema - canonical CICFlowMeter column set
//!
//! The canonical feature order is the model input order. Datasets vary in which
//! columns they carry, so selection always intersects and never defaults.

/// Canonical feature columns, in model input order
pub const FEATURE_COLUMNS: [&str; 18] = [
    "Flow Duration",
    "Total Fwd Packets",
    "Total Backward Packets",
    "Flow Packets/s",
    "Packet Length Mean",
    "Packet Length Std",
    "Packet Length Variance",
    "Min Packet Length",
    "Max Packet Length",
    "Flow IAT Mean",
    "Flow IAT Std",
    "Fwd IAT Mean",
    "Bwd IAT Mean",
    "SYN Flag Count",
    "ACK Flag Count",
    "RST Flag Count",
    "Down/Up Ratio",
    "Average Packet Size",
];

/// Optional metadata columns carried alongside the features
pub const EXTRA_COLUMNS: [&str; 4] = ["Timestamp", "Label", "Destination Port", "Protocol"];

/// Column attached by the watcher when a classifier is configured
pub const PREDICTION_COLUMN: &str = "prediction";

/// Optional per-record anomaly score column
pub const SCORE_COLUMN: &str = "score";

/// Ground-truth label column (CIC datasets)
pub const LABEL_COLUMN: &str = "Label";

/// Label used when a record carries neither prediction nor label
pub const BENIGN_LABEL: &str = "BENIGN";

/// Strip surrounding whitespace from a header name.
///
/// CIC exports pad most headers with a leading space (`" Flow Duration"`).
pub fn normalize_header(name: &str) -> String {
    name.trim().to_string()
}

/// Result of intersecting a header row with a fixed column set
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnSelection {
    /// Columns found, in canonical order
    pub present: Vec<&'static str>,
    /// Canonical columns not found
    pub missing: Vec<&'static str>,
}

impl ColumnSelection {
    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Intersect `headers` with `columns`, keeping the order of `columns`
pub fn select_columns<S: AsRef<str>>(headers: &[S], columns: &[&'static str]) -> ColumnSelection {
    let mut selection = ColumnSelection::default();
    for column in columns {
        if headers.iter().any(|h| h.as_ref() == *column) {
            selection.present.push(*column);
        } else {
            selection.missing.push(*column);
        }
    }
    selection
}

/// Canonical features present in `headers`
pub fn select_features<S: AsRef<str>>(headers: &[S]) -> ColumnSelection {
    select_columns(headers, &FEATURE_COLUMNS)
}

/// Columns the producer keeps: features, then extras when requested
pub fn producer_columns<S: AsRef<str>>(headers: &[S], include_extra: bool) -> Vec<&'static str> {
    let mut keep = select_features(headers).present;
    if include_extra {
        keep.extend(select_columns(headers, &EXTRA_COLUMNS).present);
    }
    keep
}
