// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! Raw record access and the sources that supply records per dataset.

use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A flat source row keyed by technical column name.
pub type Record = Map<String, Value>;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Text form of a field. Absent, null and empty values are all missing.
pub fn field_text(record: &Record, column: &str) -> Option<String> {
    match record.get(column)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

pub fn field_number(record: &Record, column: &str) -> Option<f64> {
    match record.get(column)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn field_datetime(record: &Record, column: &str) -> Option<DateTime<Utc>> {
    record.get(column).and_then(Value::as_str).and_then(parse_datetime)
}

pub fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch(&self, dataset_id: &str) -> SourceResult<Arc<Vec<Record>>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    datasets: HashMap<String, Arc<Vec<Record>>>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, dataset_id: impl Into<String>, records: Vec<Record>) -> Self {
        self.insert(dataset_id, records);
        self
    }

    pub fn insert(&mut self, dataset_id: impl Into<String>, records: Vec<Record>) {
        let dataset_id = dataset_id.into();
        debug!(dataset = %dataset_id, records = records.len(), "Registered records");
        self.datasets.insert(dataset_id, Arc::new(records));
    }

    pub fn dataset_ids(&self) -> impl Iterator<Item = &str> {
        self.datasets.keys().map(String::as_str)
    }

    /// Accepts `{"<dataset>": [..]}`, optionally wrapped in a `data` object.
    pub fn from_json_by_dataset(json: &str) -> SourceResult<Self> {
        let root: Value = serde_json::from_str(json)?;
        let root = match root {
            Value::Object(mut map) if map.get("data").is_some_and(Value::is_object) => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        let Value::Object(map) = root else {
            return Err(SourceError::InvalidRecord {
                index: 0,
                reason: "expected an object keyed by dataset id".to_string(),
            });
        };
        let mut source = Self::new();
        for (dataset_id, rows) in map {
            source.insert(dataset_id, records_from_value(rows)?);
        }
        Ok(source)
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn fetch(&self, dataset_id: &str) -> SourceResult<Arc<Vec<Record>>> {
        self.datasets
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| SourceError::DatasetUnavailable {
                dataset: dataset_id.to_string(),
            })
    }
}

fn records_from_value(value: Value) -> SourceResult<Vec<Record>> {
    let Value::Array(rows) = value else {
        return Err(SourceError::InvalidRecord {
            index: 0,
            reason: "expected an array of records".to_string(),
        });
    };
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| match row {
            Value::Object(record) => Ok(record),
            other => Err(SourceError::InvalidRecord {
                index,
                reason: format!("expected an object, found {other}"),
            }),
        })
        .collect()
}

/// Parses a JSON array of records, or an object carrying one under `data`.
pub fn parse_json_records(json: &str) -> SourceResult<Vec<Record>> {
    let value: Value = serde_json::from_str(json)?;
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            records_from_value(map.remove("data").unwrap_or(Value::Null))
        }
        other => records_from_value(other),
    }
}

/// Reads CSV with a header row. Cells are typed as numbers or booleans when
/// they parse as such; empty cells are left out of the record.
pub fn parse_csv_records<R: std::io::Read>(reader: R) -> SourceResult<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if cell.is_empty() {
                continue;
            }
            record.insert(header.to_string(), typed_cell(cell));
        }
        records.push(record);
    }
    Ok(records)
}

fn typed_cell(cell: &str) -> Value {
    if let Ok(int) = cell.parse::<i64>() {
        return Value::Number(int.into());
    }
    if let Some(number) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(number);
    }
    match cell {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(cell.to_string()),
    }
}

/// Loads records from a `.json` or `.csv` file.
pub fn load_records_file<P: AsRef<Path>>(path: P) -> SourceResult<Vec<Record>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let file_error = |source| SourceError::RecordFileError {
        path: path.display().to_string(),
        source,
    };
    let records = match extension.as_str() {
        "json" => parse_json_records(&fs::read_to_string(path).map_err(file_error)?)?,
        "csv" => parse_csv_records(fs::File::open(path).map_err(file_error)?)?,
        other => {
            return Err(SourceError::UnsupportedFormat {
                format: other.to_string(),
            })
        }
    };
    info!(path = %path.display(), records = records.len(), "Loaded records file");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_string_is_missing() {
        let record = json!({"environment": "", "status": "PASSED", "duration_seconds": 12})
            .as_object()
            .cloned()
            .unwrap();
        assert_eq!(field_text(&record, "environment"), None);
        assert_eq!(field_text(&record, "status").as_deref(), Some("PASSED"));
        assert_eq!(field_number(&record, "duration_seconds"), Some(12.0));
        assert_eq!(field_text(&record, "absent"), None);
    }

    #[test]
    fn parses_supported_datetime_shapes() {
        for value in ["2024-03-01", "2024-03-01T10:00:00", "2024-03-01 10:00:00", "2024-03-01T10:00:00Z"] {
            assert!(parse_datetime(value).is_some(), "{value}");
        }
        assert!(parse_datetime("March 1st").is_none());
    }
}
