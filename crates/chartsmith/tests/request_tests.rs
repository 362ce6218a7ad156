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

mod common;

use chartsmith::records::{load_records_file, parse_csv_records, InMemoryRecordSource, RecordSource};
use chartsmith::request::{build_configuration, ErrorPayload, PreviewReply, RequestFilter};
use chartsmith::settings::PreviewSettings;
use chartsmith::{
    execute_preview, ChartBuilder, ChartDataResponse, ChartType, EngineSettings, ErrorKind,
    FilterOperator, PreviewRequest, TimeRange,
};
use chrono::Utc;
use common::{builtin_catalog, records};
use serde_json::json;
use std::io::Write;
use tempfile::{Builder, NamedTempFile};

fn rows() -> Vec<chartsmith::Record> {
    records(vec![
        json!({"status": "PASSED", "environment": "QA", "duration_seconds": 40}),
        json!({"status": "FAILED", "environment": "QA", "duration_seconds": 200}),
        json!({"status": "PASSED", "environment": "Staging", "duration_seconds": 90}),
    ])
}

#[test]
fn test_request_json_shape() {
    let request = PreviewRequest::from_json(
        r#"{
            "datasetId": "test_execution",
            "metricIds": ["pass_rate"],
            "dimensionIds": ["environment"],
            "filters": [{"filterId": "duration_filter", "operator": "between", "value": {"min": 0, "max": 100}}]
        }"#,
    )
    .unwrap();
    assert_eq!(request.disclosure_level, 1);
    assert_eq!(request.filters[0].operator, FilterOperator::Between);
    assert!(request.chart_type.is_none());
}

#[test]
fn test_execute_preview_reply() {
    let mut request = PreviewRequest::new("test_execution")
        .with_metric("pass_rate")
        .with_dimension("environment");
    request.disclosure_level = 2;
    request.filters.push(RequestFilter {
        filter_id: "duration_filter".to_string(),
        operator: FilterOperator::Between,
        value: json!([0, 100]),
    });

    let response = execute_preview(
        builtin_catalog(),
        &request,
        &rows(),
        &PreviewSettings::default(),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(response.chart_type, ChartType::Bar);
    assert_eq!(response.metadata.input_count, 2);

    let value = serde_json::to_value(PreviewReply::from(Ok(response))).unwrap();
    assert_eq!(value["chartType"], "bar");
    assert_eq!(value["points"][0]["groupLabel"], "QA");
    assert_eq!(value["points"][0]["values"]["pass_rate"], 100.0);
    assert_eq!(value["metadata"]["outputCount"], 2);
}

#[test]
fn test_incomplete_request_is_empty_table() {
    let request = PreviewRequest::new("test_execution").with_metric("pass_rate");
    let response = execute_preview(
        builtin_catalog(),
        &request,
        &rows(),
        &PreviewSettings::default(),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(response.chart_type, ChartType::Table);
    assert!(response.points.is_empty());
}

#[test]
fn test_error_reply_carries_kind_and_message() {
    let request = PreviewRequest::new("test_execution")
        .with_metric("tests_per_hour")
        .with_dimension("environment");
    let outcome = execute_preview(
        builtin_catalog(),
        &request,
        &rows(),
        &PreviewSettings::default(),
        Utc::now(),
    );
    let value = serde_json::to_value(PreviewReply::from(outcome)).unwrap();
    assert_eq!(value["kind"], "unknownMetric");
    assert!(value["message"].as_str().unwrap().contains("Test Throughput"));

    let err = build_configuration(builtin_catalog(), &PreviewRequest::new("nope")).unwrap_err();
    assert_eq!(ErrorPayload::from(&err).kind, ErrorKind::NotFound);
}

#[test]
fn test_oversized_time_range_in_request_is_rejected() {
    let request = PreviewRequest::from_json(
        r#"{
            "datasetId": "test_execution",
            "metricIds": ["total_executions"],
            "dimensionIds": ["environment"],
            "disclosureLevel": 2,
            "timeRange": {"type": "relative", "value": "last_9999999999999_days"}
        }"#,
    )
    .unwrap();
    let err = build_configuration(builtin_catalog(), &request).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);

    let mut builder = ChartBuilder::with_catalog(builtin_catalog(), EngineSettings::for_testing());
    assert!(builder.apply_request(&request).is_err());
    let config = builder.configuration().unwrap();
    assert_eq!(config.assigned_metrics().len(), 1);
    assert!(config.time_range().is_none());

    builder.set_time_range(Some(TimeRange::last_days(30))).unwrap();
    let err = builder
        .set_time_range(request.time_range.clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);
    assert_eq!(
        builder.configuration().unwrap().time_range(),
        Some(&TimeRange::last_days(30))
    );
}

#[test]
fn test_chart_type_override_in_request() {
    let mut request = PreviewRequest::new("test_execution")
        .with_metric("total_executions")
        .with_dimension("environment");
    request.chart_type = Some(ChartType::Pie);
    let config = build_configuration(builtin_catalog(), &request).unwrap();
    assert_eq!(config.chart_type(), Some(ChartType::Pie));
}

#[tokio::test]
async fn test_chart_data_envelope() {
    let mut builder = ChartBuilder::with_catalog(builtin_catalog(), EngineSettings::for_testing());
    let request = PreviewRequest::new("test_execution")
        .with_metric("avg_duration")
        .with_dimension("environment");
    builder.apply_request(&request).unwrap();
    let source = InMemoryRecordSource::new().with_records("test_execution", rows());
    let result = builder.refresh_preview(&source).await.result().cloned().unwrap();

    let dataset = builder.catalog().get_dataset("test_execution").unwrap();
    let envelope = ChartDataResponse::from_preview(dataset, &result);
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["metadata"]["dataset"], "Test Execution Results");
    assert_eq!(value["metadata"]["originalRecords"], 3);
    assert_eq!(value["metadata"]["aggregatedPoints"], 2);
    assert_eq!(value["data"][0]["values"]["avg_duration"], 120.0);
    assert!(value["metadata"]["responseId"].is_string());
}

#[tokio::test]
async fn test_records_by_dataset_json() {
    let source = InMemoryRecordSource::from_json_by_dataset(
        r#"{"data": {"test_execution": [{"status": "PASSED"}], "defect_tracking": []}}"#,
    )
    .unwrap();
    assert_eq!(source.fetch("test_execution").await.unwrap().len(), 1);
    assert!(source.fetch("defect_tracking").await.unwrap().is_empty());
    assert!(source.fetch("requirement_coverage").await.is_err());
}

#[test]
fn test_csv_cells_are_typed() {
    let csv = "status,environment,duration_seconds\nPASSED,QA,12\nFAILED,,7.5\n";
    let parsed = parse_csv_records(csv.as_bytes()).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[0]["duration_seconds"], json!(12));
    assert_eq!(parsed[1]["duration_seconds"], json!(7.5));
    assert!(!parsed[1].contains_key("environment"));
}

#[test]
fn test_load_records_files() {
    let mut json_file = Builder::new().suffix(".json").tempfile().unwrap();
    write!(json_file, r#"[{{"status": "PASSED"}}, {{"status": "ERROR"}}]"#).unwrap();
    assert_eq!(load_records_file(json_file.path()).unwrap().len(), 2);

    let mut csv_file = Builder::new().suffix(".csv").tempfile().unwrap();
    write!(csv_file, "status\nPASSED\n").unwrap();
    assert_eq!(load_records_file(csv_file.path()).unwrap().len(), 1);

    let other = NamedTempFile::new().unwrap();
    assert!(load_records_file(other.path()).is_err());
}
