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

//! JSON request and response shapes for collaborators outside the session.

use crate::aggregation::{AggregatedPoint, AggregationMetadata};
use crate::catalog::{Dataset, FieldCatalog};
use crate::chart_type::ChartType;
use crate::config::{ChartConfiguration, ConfigurationState, FieldRole, Slot};
use crate::error::{AssignmentError, ChartBuilderError, ErrorKind, Result};
use crate::filtering::{FilterOperator, TimeRange};
use crate::preview::{PreviewOrchestrator, PreviewResult};
use crate::records::Record;
use crate::settings::PreviewSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub filter_id: String,
    pub operator: FilterOperator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub dataset_id: String,
    #[serde(default)]
    pub metric_ids: Vec<String>,
    #[serde(default)]
    pub dimension_ids: Vec<String>,
    #[serde(default)]
    pub filters: Vec<RequestFilter>,
    #[serde(default = "default_level")]
    pub disclosure_level: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}
fn default_level() -> i64 {
    1
}
impl PreviewRequest {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            metric_ids: Vec::new(),
            dimension_ids: Vec::new(),
            filters: Vec::new(),
            disclosure_level: default_level(),
            chart_type: None,
            time_range: None,
        }
    }
    pub fn with_metric(mut self, id: impl Into<String>) -> Self {
        self.metric_ids.push(id.into());
        self
    }
    pub fn with_dimension(mut self, id: impl Into<String>) -> Self {
        self.dimension_ids.push(id.into());
        self
    }
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub chart_type: ChartType,
    pub points: Vec<AggregatedPoint>,
    pub metadata: AggregationMetadata,
}
impl From<PreviewResult> for PreviewResponse {
    fn from(result: PreviewResult) -> Self {
        Self {
            chart_type: result.chart_type,
            points: result.points,
            metadata: result.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
}
impl From<&ChartBuilderError> for ErrorPayload {
    fn from(err: &ChartBuilderError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

/// Either outcome of a preview request, serialised without a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreviewReply {
    Preview(PreviewResponse),
    Error(ErrorPayload),
}
impl From<Result<PreviewResponse>> for PreviewReply {
    fn from(outcome: Result<PreviewResponse>) -> Self {
        match outcome {
            Ok(response) => PreviewReply::Preview(response),
            Err(err) => PreviewReply::Error(ErrorPayload::from(&err)),
        }
    }
}

/// Replays `request` through a fresh [`ConfigurationState`], so a request
/// is held to the same checks as interactive edits.
pub fn build_configuration(
    catalog: Arc<FieldCatalog>,
    request: &PreviewRequest,
) -> Result<ChartConfiguration> {
    let mut state = ConfigurationState::new(catalog);
    Ok(apply_request(&mut state, request)?.clone())
}

/// Selects the request's dataset on `state` and applies every edit it
/// carries, stopping at the first rejected one.
pub fn apply_request<'s>(
    state: &'s mut ConfigurationState,
    request: &PreviewRequest,
) -> Result<&'s ChartConfiguration> {
    state.select_dataset(&request.dataset_id)?;
    state.set_disclosure_level(request.disclosure_level)?;
    for metric_id in &request.metric_ids {
        state.assign_field(metric_id, FieldRole::Metric, Slot::Metrics)?;
    }
    for dimension_id in &request.dimension_ids {
        state.assign_field(dimension_id, FieldRole::Dimension, Slot::Dimensions)?;
    }
    for filter in &request.filters {
        state.add_filter(&filter.filter_id, filter.operator, filter.value.clone())?;
    }
    if request.time_range.is_some() {
        state.set_time_range(request.time_range.clone())?;
    }
    if let Some(chart_type) = request.chart_type {
        state.set_chart_type(chart_type)?;
    }
    state
        .configuration()
        .ok_or_else(|| AssignmentError::NoActiveDataset.into())
}

/// Runs a one-shot preview over `records`. Incomplete requests yield an
/// empty table rather than an error.
pub fn execute_preview(
    catalog: Arc<FieldCatalog>,
    request: &PreviewRequest,
    records: &[Record],
    settings: &PreviewSettings,
    now: DateTime<Utc>,
) -> Result<PreviewResponse> {
    let config = build_configuration(Arc::clone(&catalog), request)?;
    if !config.is_complete() {
        return Ok(PreviewResponse {
            chart_type: ChartType::Table,
            points: Vec::new(),
            metadata: AggregationMetadata {
                input_count: records.len(),
                output_count: 0,
            },
        });
    }
    let orchestrator = PreviewOrchestrator::new(catalog, settings.clone()).with_reference_time(now);
    Ok(orchestrator.evaluate(&config, records)?.into())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataMetadata {
    pub dataset: String,
    pub original_records: usize,
    pub filtered_records: usize,
    pub aggregated_points: usize,
    pub chart_type: ChartType,
    pub generated_at: DateTime<Utc>,
    pub response_id: Uuid,
}

/// Envelope returned to HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartDataResponse {
    pub data: Vec<AggregatedPoint>,
    pub metadata: ChartDataMetadata,
}
impl ChartDataResponse {
    pub fn from_preview(dataset: &Dataset, result: &PreviewResult) -> Self {
        Self {
            data: result.points.clone(),
            metadata: ChartDataMetadata {
                dataset: dataset.name.clone(),
                original_records: result.source_records,
                filtered_records: result.filtered_records,
                aggregated_points: result.points.len(),
                chart_type: result.chart_type,
                generated_at: result.generated_at,
                response_id: Uuid::new_v4(),
            },
        }
    }
}
