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

//! Chart configuration and aggregation engine.
//!
//! A [`ChartBuilder`] session binds a [`FieldCatalog`] of business datasets to
//! an editable [`ChartConfiguration`]. Every edit re-infers the chart type and
//! schedules a new preview generation; [`ChartBuilder::refresh_preview`] pulls
//! records from a [`RecordSource`] and aggregates them into labelled points.

pub mod aggregation;
pub mod catalog;
pub mod chart_type;
pub mod config;
pub mod error;
pub mod filtering;
pub mod preview;
pub mod records;
pub mod request;
pub mod settings;

pub use aggregation::{aggregate, AggregatedPoint, AggregationMetadata, AggregationOutput, Aggregator};
pub use catalog::{Dataset, Dimension, DimensionKind, FieldCatalog, Filter, FilterKind, Metric};
pub use chart_type::{infer_chart_type, ChartType};
pub use config::{
    AssignedField, ChartConfiguration, ConfigurationState, DisclosureLevel, FieldRole, Slot,
};
pub use error::{ChartBuilderError, ErrorKind, ErrorReporter, Result};
pub use filtering::{ActiveFilter, FilterOperator, TimeRange};
pub use preview::{PreviewOrchestrator, PreviewPhase, PreviewResult, PreviewState, PreviewTicket};
pub use records::{InMemoryRecordSource, Record, RecordSource};
pub use request::{execute_preview, ChartDataResponse, PreviewReply, PreviewRequest, PreviewResponse};
pub use settings::EngineSettings;

use error::AssignmentError;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One user's chart-building session.
#[derive(Debug)]
pub struct ChartBuilder {
    state: ConfigurationState,
    preview: PreviewOrchestrator,
    pending: Option<PreviewTicket>,
}
impl ChartBuilder {
    /// Session over the built-in QA catalog with default settings.
    pub fn new() -> Result<Self> {
        Self::with_settings(EngineSettings::default())
    }
    pub fn with_settings(settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let catalog = match &settings.catalog_path {
            Some(path) => FieldCatalog::from_yaml_file(path)?,
            None => FieldCatalog::builtin()?,
        };
        Ok(Self::with_catalog(Arc::new(catalog), settings))
    }
    pub fn with_catalog(catalog: Arc<FieldCatalog>, settings: EngineSettings) -> Self {
        info!(
            datasets = catalog.len(),
            latency_ms = settings.preview.simulated_latency_ms,
            "Chart builder session started"
        );
        Self {
            state: ConfigurationState::new(Arc::clone(&catalog))
                .with_default_level(settings.default_disclosure_level),
            preview: PreviewOrchestrator::new(catalog, settings.preview),
            pending: None,
        }
    }
    pub fn catalog(&self) -> &Arc<FieldCatalog> {
        self.state.catalog()
    }
    pub fn list_datasets(&self) -> &[Dataset] {
        self.state.catalog().list_datasets()
    }
    pub fn configuration(&self) -> Option<&ChartConfiguration> {
        self.state.configuration()
    }
    pub fn preview_state(&self) -> &PreviewState {
        self.preview.state()
    }
    pub fn preview(&self) -> &PreviewOrchestrator {
        &self.preview
    }

    pub fn select_dataset(&mut self, dataset_id: &str) -> Result<&ChartConfiguration> {
        self.state.select_dataset(dataset_id)?;
        self.after_mutation()
    }
    pub fn assign_field(
        &mut self,
        field_id: &str,
        role: FieldRole,
        slot: Slot,
    ) -> Result<&ChartConfiguration> {
        self.state.assign_field(field_id, role, slot)?;
        self.after_mutation()
    }
    pub fn remove_field(&mut self, field_id: &str, slot: Slot) -> Result<&ChartConfiguration> {
        self.state.remove_field(field_id, slot)?;
        self.after_mutation()
    }
    pub fn set_chart_type(&mut self, chart_type: ChartType) -> Result<&ChartConfiguration> {
        self.state.set_chart_type(chart_type)?;
        self.after_mutation()
    }
    pub fn add_filter(
        &mut self,
        filter_id: &str,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Result<&ChartConfiguration> {
        self.state.add_filter(filter_id, operator, value)?;
        self.after_mutation()
    }
    pub fn remove_filter(&mut self, filter_id: &str) -> Result<&ChartConfiguration> {
        self.state.remove_filter(filter_id)?;
        self.after_mutation()
    }
    pub fn set_time_range(&mut self, range: Option<TimeRange>) -> Result<&ChartConfiguration> {
        self.state.set_time_range(range)?;
        self.after_mutation()
    }
    pub fn set_disclosure_level(&mut self, level: i64) -> Result<&ChartConfiguration> {
        self.state.set_disclosure_level(level)?;
        self.after_mutation()
    }
    pub fn reset(&mut self) -> Result<&ChartConfiguration> {
        self.state.reset()?;
        self.after_mutation()
    }

    /// Replaces the configuration with the one described by `request`,
    /// scheduling a single preview generation for the whole batch. Edits
    /// applied before a rejected one are kept.
    pub fn apply_request(&mut self, request: &PreviewRequest) -> Result<&ChartConfiguration> {
        let applied = request::apply_request(&mut self.state, request).map(|_| ());
        let config = self.after_mutation();
        applied.and(config)
    }

    /// Hands the pending computation to a caller that schedules its own work.
    pub fn take_pending(&mut self) -> Option<PreviewTicket> {
        self.pending.take()
    }
    /// Returns `false` when the ticket was superseded by a later edit.
    pub fn complete_preview(&mut self, ticket: &PreviewTicket, records: &[Record]) -> bool {
        self.preview.complete(ticket, records)
    }

    /// Resolves the pending generation, if any, against `source`.
    pub async fn refresh_preview<S: RecordSource + ?Sized>(&mut self, source: &S) -> &PreviewState {
        let Some(ticket) = self.pending.take() else {
            return self.preview.state();
        };
        let latency = self.preview.settings().simulated_latency_ms;
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        match source.fetch(ticket.configuration().dataset_id()).await {
            Ok(records) => self.preview.complete(&ticket, &records),
            Err(err) => self.preview.fail(&ticket, &err.into()),
        };
        self.preview.state()
    }

    fn after_mutation(&mut self) -> Result<&ChartConfiguration> {
        let config = self
            .state
            .configuration()
            .ok_or(AssignmentError::NoActiveDataset)?;
        self.pending = self.preview.begin(config);
        Ok(config)
    }
}
