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

use crate::catalog::FilterKind;
use crate::config::{FieldRole, Slot};
use crate::filtering::FilterOperator;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use thiserror::Error;
#[derive(Error, Debug)]
pub enum ChartBuilderError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("Assignment error: {0}")]
    Assignment(#[from] AssignmentError),
    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),
    #[error("Record source error: {0}")]
    Source(#[from] SourceError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to parse catalog YAML: {source}")]
    YamlParseError {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Failed to read catalog file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Dataset '{id}' not found in catalog")]
    DatasetNotFound { id: String },
    #[error("Metric '{id}' not found in dataset '{dataset}'")]
    MetricNotFound { dataset: String, id: String },
    #[error("Dimension '{id}' not found in dataset '{dataset}'")]
    DimensionNotFound { dataset: String, id: String },
    #[error("Filter '{id}' not found in dataset '{dataset}'")]
    FilterNotFound { dataset: String, id: String },
    #[error("Duplicate dataset id found: '{id}'")]
    DuplicateDataset { id: String },
    #[error("Duplicate {kind} id '{id}' in dataset '{dataset}'")]
    DuplicateField {
        dataset: String,
        kind: &'static str,
        id: String,
    },
    #[error("Dataset '{dataset}' references unknown related dataset '{related}'")]
    UnknownRelatedDataset { dataset: String, related: String },
    #[error("Catalog contains no datasets")]
    EmptyCatalog,
}
#[derive(Error, Debug)]
pub enum AssignmentError {
    #[error("No dataset selected")]
    NoActiveDataset,
    #[error("Field '{field}' with role {role} cannot be placed in the {slot} slot")]
    RoleSlotMismatch {
        field: String,
        role: FieldRole,
        slot: Slot,
    },
    #[error("Field '{field}' belongs to {} and not to active dataset '{active}'", owners.join(", "))]
    ForeignField {
        field: String,
        active: String,
        owners: Vec<String>,
    },
    #[error("Operator '{operator}' is not supported by {kind} filter '{filter}'")]
    IncompatibleFilterOperator {
        filter: String,
        kind: FilterKind,
        operator: FilterOperator,
    },
    #[error("Invalid value for filter '{filter}': {reason}")]
    InvalidFilterValue { filter: String, reason: String },
}
#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Metric '{name}' ({id}) has no defined computation")]
    UnknownMetric { id: String, name: String },
    #[error("Configuration is incomplete: no {missing} assigned")]
    IncompleteConfiguration { missing: &'static str },
}
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("No records available for dataset '{dataset}'")]
    DatasetUnavailable { dataset: String },
    #[error("Failed to read record file '{path}': {source}")]
    RecordFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported record format: {format}")]
    UnsupportedFormat { format: String },
    #[error("Failed to parse JSON records: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("Failed to parse CSV records: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },
    #[error("Record {index} is not a flat object: {reason}")]
    InvalidRecord { index: usize, reason: String },
}
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to parse settings YAML: {source}")]
    YamlParseError {
        #[from]
        source: serde_yaml::Error,
    },
    #[error("Failed to read settings file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid engine settings: {field} = {value}")]
    OutOfRange { field: String, value: String },
}
pub type Result<T> = std::result::Result<T, ChartBuilderError>;
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;
pub type SourceResult<T> = std::result::Result<T, SourceError>;
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// Coarse classification shared with the view layer in error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    InvalidAssignment,
    IncompleteConfiguration,
    UnknownMetric,
    RecordSource,
    Configuration,
}
impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "notFound",
            ErrorKind::InvalidAssignment => "invalidAssignment",
            ErrorKind::IncompleteConfiguration => "incompleteConfiguration",
            ErrorKind::UnknownMetric => "unknownMetric",
            ErrorKind::RecordSource => "recordSource",
            ErrorKind::Configuration => "configuration",
        }
    }
}
impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::DatasetNotFound { .. }
                | CatalogError::MetricNotFound { .. }
                | CatalogError::DimensionNotFound { .. }
                | CatalogError::FilterNotFound { .. }
        )
    }
}
impl ChartBuilderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChartBuilderError::Catalog(err) if err.is_not_found() => ErrorKind::NotFound,
            ChartBuilderError::Catalog(_) => ErrorKind::Configuration,
            ChartBuilderError::Assignment(_) => ErrorKind::InvalidAssignment,
            ChartBuilderError::Aggregation(AggregationError::UnknownMetric { .. }) => {
                ErrorKind::UnknownMetric
            }
            ChartBuilderError::Aggregation(AggregationError::IncompleteConfiguration {
                ..
            }) => ErrorKind::IncompleteConfiguration,
            ChartBuilderError::Source(_) | ChartBuilderError::Io(_) => ErrorKind::RecordSource,
            ChartBuilderError::Settings(_) | ChartBuilderError::Serialisation(_) => {
                ErrorKind::Configuration
            }
        }
    }
    /// Whether the user can fix the problem by changing the chart configuration.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::InvalidAssignment
                | ErrorKind::IncompleteConfiguration
                | ErrorKind::UnknownMetric
        )
    }
    pub fn category(&self) -> &'static str {
        match self {
            ChartBuilderError::Catalog(_) => "Catalog",
            ChartBuilderError::Assignment(_) => "Assignment",
            ChartBuilderError::Aggregation(_) => "Aggregation",
            ChartBuilderError::Source(_) => "Record source",
            ChartBuilderError::Settings(_) => "Settings",
            ChartBuilderError::Io(_) => "I/O",
            ChartBuilderError::Serialisation(_) => "Serialisation",
        }
    }
    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::IncompleteConfiguration => ErrorSeverity::Info,
            ErrorKind::NotFound | ErrorKind::InvalidAssignment => ErrorSeverity::Warning,
            ErrorKind::UnknownMetric | ErrorKind::RecordSource => ErrorSeverity::Error,
            ErrorKind::Configuration => ErrorSeverity::Critical,
        }
    }
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            ChartBuilderError::Aggregation(AggregationError::UnknownMetric { .. }) => vec![
                "Remove the metric from the metrics slot".to_string(),
                "Pick a metric with a supported computation".to_string(),
            ],
            ChartBuilderError::Aggregation(AggregationError::IncompleteConfiguration {
                ..
            }) => vec!["Add at least one metric and one dimension".to_string()],
            ChartBuilderError::Assignment(AssignmentError::RoleSlotMismatch { .. }) => vec![
                "Drop metrics into the metrics slot".to_string(),
                "Drop dimensions into the dimensions slot".to_string(),
            ],
            ChartBuilderError::Assignment(AssignmentError::ForeignField { .. }) => vec![
                "Select the dataset that owns this field first".to_string(),
            ],
            ChartBuilderError::Assignment(AssignmentError::NoActiveDataset) => {
                vec!["Select a dataset before adding fields".to_string()]
            }
            ChartBuilderError::Catalog(CatalogError::DatasetNotFound { .. }) => vec![
                "Check the dataset id spelling".to_string(),
                "List available datasets to see valid options".to_string(),
            ],
            _ => vec!["Check the error message for specific guidance".to_string()],
        }
    }
    pub fn user_message(&self) -> String {
        match self {
            ChartBuilderError::Aggregation(AggregationError::UnknownMetric { name, .. }) => {
                format!("The metric \"{name}\" cannot be computed for the preview yet.")
            }
            ChartBuilderError::Aggregation(AggregationError::IncompleteConfiguration {
                ..
            }) => "Add metrics and dimensions to see a preview.".to_string(),
            ChartBuilderError::Source(SourceError::DatasetUnavailable { dataset }) => {
                format!("No data is available for dataset \"{dataset}\".")
            }
            _ => self.to_string(),
        }
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}
impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
    pub fn color_code(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "\x1b[36m",
            ErrorSeverity::Warning => "\x1b[33m",
            ErrorSeverity::Error => "\x1b[31m",
            ErrorSeverity::Critical => "\x1b[35m",
        }
    }
}
pub struct ErrorReporter {
    pub show_suggestions: bool,
    pub colored_output: bool,
}
impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            show_suggestions: true,
            colored_output: true,
        }
    }
    pub fn plain() -> Self {
        Self {
            show_suggestions: true,
            colored_output: false,
        }
    }
    /// One headline `<kind> (<severity>, <category>): <message>`, followed by
    /// indented `try:` lines for recoverable errors.
    pub fn report(&self, error: &ChartBuilderError) -> String {
        let severity = error.severity();
        let kind = error.kind().as_str();
        let mut output = String::new();
        if self.colored_output {
            let _ = write!(output, "{}{kind}\x1b[0m", severity.color_code());
        } else {
            output.push_str(kind);
        }
        let _ = writeln!(
            output,
            " ({}, {}): {}",
            severity.as_str().to_lowercase(),
            error.category(),
            error.user_message()
        );
        if !error.is_recoverable() {
            output.push_str("  the chart configuration cannot fix this\n");
        } else if self.show_suggestions {
            for suggestion in error.suggestions() {
                let _ = writeln!(output, "  try: {suggestion}");
            }
        }
        output
    }
}
impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_report_lists_suggestions() {
        let err = ChartBuilderError::from(AggregationError::UnknownMetric {
            id: "tests_per_hour".to_string(),
            name: "Test Throughput".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::UnknownMetric);
        assert!(err.is_recoverable());
        let report = ErrorReporter::plain().report(&err);
        assert!(report.starts_with("unknownMetric (error, Aggregation):"));
        assert!(report.contains("Test Throughput"));
        assert!(report.lines().skip(1).all(|line| line.starts_with("  try: ")));
        assert!(report.lines().count() > 1);
    }

    #[test]
    fn catalog_failures_are_not_recoverable() {
        let err = ChartBuilderError::from(CatalogError::EmptyCatalog);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(!err.is_recoverable());
        let report = ErrorReporter::plain().report(&err);
        assert!(report.starts_with("configuration (critical, Catalog):"));
        assert!(!report.contains("try:"));
    }
}
