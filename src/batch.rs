//! Flow Batch - tabular flow records read from and written to CSV
//!
//! Cells are kept as the text the dataset carried. Numeric conversion only
//! happens when a feature matrix is built for the classifier.

use std::io::{Read, Write};
use std::path::Path;

use crate::error::BatchError;
use crate::schema::normalize_header;

/// Ordered rows sharing one header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowBatch {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// One row viewed as `column -> value`
#[derive(Debug, Clone, Copy)]
pub struct FlowRecord<'a> {
    headers: &'a [String],
    values: &'a [String],
}

/// Row-major numeric features in a fixed column order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FlowBatch {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    /// Read CSV with normalized headers
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, BatchError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = rdr.headers()?.iter().map(normalize_header).collect();

        let mut batch = Self::new(headers);
        for record in rdr.records() {
            let record = record?;
            batch.rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(batch)
    }

    pub fn read_path(path: &Path) -> Result<Self, BatchError> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(std::io::BufReader::new(file))
    }

    /// Write rows as CSV, with the header row only when `with_header` is set
    pub fn write_csv<W: Write>(&self, writer: W, with_header: bool) -> Result<(), BatchError> {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        if with_header {
            wtr.write_record(&self.headers)?;
        }
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == column)
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn records(&self) -> impl Iterator<Item = FlowRecord<'_>> {
        self.rows.iter().map(|values| FlowRecord {
            headers: &self.headers,
            values,
        })
    }

    /// New batch holding only `columns`, in that order. Unknown columns are skipped.
    pub fn project(&self, columns: &[&str]) -> Self {
        let indices: Vec<(usize, &str)> = columns
            .iter()
            .filter_map(|c| self.column_index(c).map(|i| (i, *c)))
            .collect();

        Self {
            headers: indices.iter().map(|(_, c)| c.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    indices
                        .iter()
                        .map(|(i, _)| row.get(*i).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    /// Numeric matrix over `columns`; blank or non-numeric cells become NaN
    pub fn feature_matrix(&self, columns: &[&str]) -> FeatureBatch {
        let projected = self.project(columns);
        let rows = projected
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| parse_number(cell)).collect())
            .collect();

        FeatureBatch {
            columns: projected.headers,
            rows,
        }
    }

    /// Append (or overwrite) a column with one value per row
    pub fn set_column(&mut self, column: &str, values: Vec<String>) {
        debug_assert_eq!(values.len(), self.rows.len());
        match self.column_index(column) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if let Some(cell) = row.get_mut(idx) {
                        *cell = value;
                    }
                }
            }
            None => {
                self.headers.push(column.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
    }
}

impl<'a> FlowRecord<'a> {
    /// Value of `column`, absent when the batch does not carry it
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|i| self.values.get(i))
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a str)> {
        self.headers
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }
}

impl FeatureBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }
}

fn parse_number(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = " Flow Duration, Total Fwd Packets,Label\n10,2,BENIGN\n20,,DDoS\n";

    #[test]
    fn test_read_csv_normalizes_headers() {
        let batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(batch.headers(), &["Flow Duration", "Total Fwd Packets", "Label"]);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_read_csv_rejects_ragged_rows() {
        let ragged = "a,b\n1,2\n3\n";
        let result = FlowBatch::read_csv(ragged.as_bytes());
        assert!(matches!(result, Err(BatchError::Malformed(_))));
    }

    #[test]
    fn test_record_lookup() {
        let batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();
        let records: Vec<_> = batch.records().collect();

        assert_eq!(records[0].get("Label"), Some("BENIGN"));
        assert_eq!(records[1].get("Total Fwd Packets"), Some(""));
        assert_eq!(records[1].get("Protocol"), None);
    }

    #[test]
    fn test_project_skips_unknown_columns() {
        let batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();
        let projected = batch.project(&["Label", "Missing", "Flow Duration"]);

        assert_eq!(projected.headers(), &["Label", "Flow Duration"]);
        assert_eq!(projected.records().next().unwrap().get("Flow Duration"), Some("10"));
    }

    #[test]
    fn test_feature_matrix_marks_blank_cells_nan() {
        let batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();
        let features = batch.feature_matrix(&["Flow Duration", "Total Fwd Packets"]);

        assert_eq!(features.rows[0], vec![10.0, 2.0]);
        assert_eq!(features.rows[1][0], 20.0);
        assert!(features.rows[1][1].is_nan());
    }

    #[test]
    fn test_set_column_appends_prediction() {
        let mut batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();
        batch.set_column("prediction", vec!["BENIGN".into(), "DDoS".into()]);

        assert_eq!(batch.headers().last().map(String::as_str), Some("prediction"));
        let last: Vec<_> = batch.records().map(|r| r.get("prediction").unwrap()).collect();
        assert_eq!(last, vec!["BENIGN", "DDoS"]);
    }

    #[test]
    fn test_write_csv_header_toggle() {
        let batch = FlowBatch::read_csv(SAMPLE.as_bytes()).unwrap();

        let mut with_header = Vec::new();
        batch.write_csv(&mut with_header, true).unwrap();
        let text = String::from_utf8(with_header).unwrap();
        assert!(text.starts_with("Flow Duration,Total Fwd Packets,Label\n"));
        assert_eq!(text.lines().count(), 3);

        let mut headerless = Vec::new();
        batch.write_csv(&mut headerless, false).unwrap();
        let text = String::from_utf8(headerless).unwrap();
        assert!(text.starts_with("10,2,BENIGN\n"));
        assert_eq!(text.lines().count(), 2);
    }
}
