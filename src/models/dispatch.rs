//! Geo dispatch record - per-flow visualization payload

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

use crate::batch::FlowRecord;
use crate::schema::{BENIGN_LABEL, LABEL_COLUMN, PREDICTION_COLUMN, SCORE_COLUMN};

/// Score assigned to non-benign flows without an explicit score
pub const ANOMALY_SCORE: f64 = 1.0;
/// Score assigned to benign flows without an explicit score
pub const BENIGN_SCORE: f64 = 0.2;
/// Score used when a score cell is not a finite number
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Columns whose concatenated values seed the synthetic coordinates
const SEED_COLUMNS: [&str; 3] = ["Flow Duration", "Total Fwd Packets", "Total Backward Packets"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeoDispatchRecord {
    #[validate(range(min = -90.0, max = 90.0))]
    pub src_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub src_lng: f64,
    #[validate(range(min = -90.0, max = 90.0))]
    pub dst_lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub dst_lng: f64,
    pub label: String,
    pub score: f64,
}

impl GeoDispatchRecord {
    /// Build the payload for one flow. Identical flows always map to identical points.
    pub fn from_record(record: &FlowRecord<'_>) -> Self {
        let seed: String = SEED_COLUMNS
            .iter()
            .map(|c| record.get(c).unwrap_or(""))
            .collect();
        let (src_lat, src_lng) = derive_coordinates(&format!("SRC{seed}"));
        let (dst_lat, dst_lng) = derive_coordinates(&format!("DST{seed}"));

        let label = record
            .get(PREDICTION_COLUMN)
            .or_else(|| record.get(LABEL_COLUMN))
            .unwrap_or(BENIGN_LABEL)
            .to_string();

        let score = match record.get(SCORE_COLUMN) {
            Some(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|s| s.is_finite())
                .unwrap_or(NEUTRAL_SCORE),
            None if label != BENIGN_LABEL => ANOMALY_SCORE,
            None => BENIGN_SCORE,
        };

        Self {
            src_lat,
            src_lng,
            dst_lat,
            dst_lng,
            label,
            score,
        }
    }
}

/// Map a seed string to a stable `(lat, lng)` pair.
///
/// Bytes 0..8 and 8..16 of the SHA-256 digest, read big-endian and scaled into
/// `[-90, 90)` and `[-180, 180)`.
pub fn derive_coordinates(seed: &str) -> (f64, f64) {
    let digest = Sha256::digest(seed.as_bytes());
    let mut a = [0u8; 8];
    let mut b = [0u8; 8];
    a.copy_from_slice(&digest[..8]);
    b.copy_from_slice(&digest[8..16]);

    let scale = 2f64.powi(64);
    let a = u64::from_be_bytes(a) as f64 / scale;
    let b = u64::from_be_bytes(b) as f64 / scale;

    (a * 180.0 - 90.0, b * 360.0 - 180.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FlowBatch;

    fn first_record(csv: &str) -> GeoDispatchRecord {
        let batch = FlowBatch::read_csv(csv.as_bytes()).unwrap();
        let record = batch.records().next().unwrap();
        GeoDispatchRecord::from_record(&record)
    }

    #[test]
    fn test_derive_coordinates_deterministic() {
        let first = derive_coordinates("SRC1234");
        let second = derive_coordinates("SRC1234");
        assert_eq!(first.0.to_bits(), second.0.to_bits());
        assert_eq!(first.1.to_bits(), second.1.to_bits());

        assert_ne!(derive_coordinates("SRC1234"), derive_coordinates("DST1234"));
    }

    #[test]
    fn test_derive_coordinates_in_range() {
        for i in 0..500 {
            let (lat, lng) = derive_coordinates(&format!("seed-{i}"));
            assert!((-90.0..=90.0).contains(&lat), "lat {lat} out of range");
            assert!((-180.0..=180.0).contains(&lng), "lng {lng} out of range");
        }
    }

    #[test]
    fn test_identical_flows_share_points() {
        let a = first_record("Flow Duration,Total Fwd Packets,Label\n10,2,BENIGN\n");
        let b = first_record("Flow Duration,Total Fwd Packets,Label\n10,2,DDoS\n");
        assert_eq!((a.src_lat, a.src_lng), (b.src_lat, b.src_lng));
        assert_eq!((a.dst_lat, a.dst_lng), (b.dst_lat, b.dst_lng));
    }

    #[test]
    fn test_label_prefers_prediction_then_label() {
        let predicted = first_record("Flow Duration,Label,prediction\n1,BENIGN,PortScan\n");
        assert_eq!(predicted.label, "PortScan");
        assert_eq!(predicted.score, ANOMALY_SCORE);

        let labelled = first_record("Flow Duration,Label\n1,DDoS\n");
        assert_eq!(labelled.label, "DDoS");

        let bare = first_record("Flow Duration\n1\n");
        assert_eq!(bare.label, BENIGN_LABEL);
        assert_eq!(bare.score, BENIGN_SCORE);
    }

    #[test]
    fn test_score_coercion() {
        let explicit = first_record("Flow Duration,score\n1,0.75\n");
        assert_eq!(explicit.score, 0.75);

        let garbage = first_record("Flow Duration,score\n1,high\n");
        assert_eq!(garbage.score, NEUTRAL_SCORE);
    }

    #[test]
    fn test_non_finite_score_falls_back_to_neutral() {
        let batch = FlowBatch::read_csv(
            "Flow Duration,score\n1,0.3\n2,NaN\n3,inf\n4,-infinity\n5,0.9\n".as_bytes(),
        )
        .unwrap();
        let scores: Vec<f64> = batch
            .records()
            .map(|r| GeoDispatchRecord::from_record(&r).score)
            .collect();
        assert_eq!(scores, vec![0.3, NEUTRAL_SCORE, NEUTRAL_SCORE, NEUTRAL_SCORE, 0.9]);

        // Every record survives a JSON round trip, so one bad cell cannot sink a batch
        let records: Vec<GeoDispatchRecord> =
            batch.records().map(|r| GeoDispatchRecord::from_record(&r)).collect();
        let json = serde_json::to_string(&records).unwrap();
        let decoded: Vec<GeoDispatchRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.len(), 5);
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let record = first_record("Flow Duration\n1\n");
        let value = serde_json::to_value(&record).unwrap();
        for key in ["srcLat", "srcLng", "dstLat", "dstLng", "label", "score"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let mut record = first_record("Flow Duration\n1\n");
        assert!(record.validate().is_ok());
        record.dst_lng = 200.0;
        assert!(record.validate().is_err());
    }
}
