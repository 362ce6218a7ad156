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

//! Preview lifecycle: `Idle -> Loading -> Ready | Error`, tagged by generation.
//!
//! Every configuration change starts a new generation. Results computed for
//! an older generation are dropped when they arrive, so the visible preview
//! always belongs to the latest configuration.

use crate::aggregation::{AggregatedPoint, AggregationMetadata, Aggregator};
use crate::catalog::FieldCatalog;
use crate::chart_type::{infer_chart_type, ChartType};
use crate::config::ChartConfiguration;
use crate::error::{ChartBuilderError, ErrorKind, Result};
use crate::filtering::RecordFilter;
use crate::records::{Record, RecordSource};
use crate::settings::PreviewSettings;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewPhase {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub generation: u64,
    pub chart_type: ChartType,
    pub points: Vec<AggregatedPoint>,
    pub metadata: AggregationMetadata,
    pub source_records: usize,
    pub filtered_records: usize,
    /// Set when the point cap dropped groups. `metadata.output_count` still
    /// counts every group.
    pub truncated: bool,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewFailure {
    pub generation: u64,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum PreviewState {
    Idle,
    Loading { generation: u64 },
    Ready(PreviewResult),
    Error(PreviewFailure),
}
impl PreviewState {
    pub fn phase(&self) -> PreviewPhase {
        match self {
            PreviewState::Idle => PreviewPhase::Idle,
            PreviewState::Loading { .. } => PreviewPhase::Loading,
            PreviewState::Ready(_) => PreviewPhase::Ready,
            PreviewState::Error(_) => PreviewPhase::Error,
        }
    }
    pub fn result(&self) -> Option<&PreviewResult> {
        match self {
            PreviewState::Ready(result) => Some(result),
            _ => None,
        }
    }
    pub fn failure(&self) -> Option<&PreviewFailure> {
        match self {
            PreviewState::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A pending computation for one generation, holding the configuration it
/// was started with.
#[derive(Debug, Clone)]
pub struct PreviewTicket {
    generation: u64,
    configuration: ChartConfiguration,
}
impl PreviewTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
    pub fn configuration(&self) -> &ChartConfiguration {
        &self.configuration
    }
}

#[derive(Debug)]
pub struct PreviewOrchestrator {
    catalog: Arc<FieldCatalog>,
    settings: PreviewSettings,
    aggregator: Aggregator,
    state: PreviewState,
    generation: u64,
    reference_time: Option<DateTime<Utc>>,
}
impl PreviewOrchestrator {
    pub fn new(catalog: Arc<FieldCatalog>, settings: PreviewSettings) -> Self {
        Self {
            catalog,
            settings,
            aggregator: Aggregator::new(),
            state: PreviewState::Idle,
            generation: 0,
            reference_time: None,
        }
    }
    /// Pins the instant relative time ranges are evaluated against.
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }
    pub fn state(&self) -> &PreviewState {
        &self.state
    }
    pub fn phase(&self) -> PreviewPhase {
        self.state.phase()
    }
    pub fn generation(&self) -> u64 {
        self.generation
    }
    pub fn settings(&self) -> &PreviewSettings {
        &self.settings
    }

    /// Starts a new generation for `config`. Returns `None` and goes idle
    /// when either slot is empty.
    pub fn begin(&mut self, config: &ChartConfiguration) -> Option<PreviewTicket> {
        self.generation += 1;
        if !config.is_complete() {
            debug!(generation = self.generation, "Preview idle: configuration incomplete");
            self.state = PreviewState::Idle;
            return None;
        }
        debug!(generation = self.generation, dataset = %config.dataset_id(), "Preview loading");
        self.state = PreviewState::Loading {
            generation: self.generation,
        };
        Some(PreviewTicket {
            generation: self.generation,
            configuration: config.clone(),
        })
    }

    /// Resolves `ticket` against `records`. Returns `false` when the ticket
    /// has been superseded and its result was discarded.
    pub fn complete(&mut self, ticket: &PreviewTicket, records: &[Record]) -> bool {
        if self.is_stale(ticket) {
            return false;
        }
        self.state = match self.compute(ticket.generation, &ticket.configuration, records) {
            Ok(result) => {
                info!(
                    generation = ticket.generation,
                    chart_type = %result.chart_type,
                    points = result.points.len(),
                    "Preview ready"
                );
                PreviewState::Ready(result)
            }
            Err(err) => Self::failure_state(ticket.generation, &err),
        };
        true
    }

    pub fn fail(&mut self, ticket: &PreviewTicket, err: &ChartBuilderError) -> bool {
        if self.is_stale(ticket) {
            return false;
        }
        self.state = Self::failure_state(ticket.generation, err);
        true
    }

    /// Fetches records for `config` and runs a full preview cycle.
    pub async fn refresh<S: RecordSource + ?Sized>(
        &mut self,
        config: &ChartConfiguration,
        source: &S,
    ) -> &PreviewState {
        let Some(ticket) = self.begin(config) else {
            return &self.state;
        };
        if self.settings.simulated_latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.simulated_latency_ms)).await;
        }
        match source.fetch(config.dataset_id()).await {
            Ok(records) => self.complete(&ticket, &records),
            Err(err) => self.fail(&ticket, &err.into()),
        };
        &self.state
    }

    fn is_stale(&self, ticket: &PreviewTicket) -> bool {
        let stale = ticket.generation != self.generation;
        if stale {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "Discarding superseded preview"
            );
        }
        stale
    }

    fn failure_state(generation: u64, err: &ChartBuilderError) -> PreviewState {
        warn!(generation, kind = err.kind().as_str(), "Preview failed: {err}");
        PreviewState::Error(PreviewFailure {
            generation,
            kind: err.kind(),
            message: err.user_message(),
        })
    }

    /// Computes a preview for `config` without touching the lifecycle state.
    pub fn evaluate(&self, config: &ChartConfiguration, records: &[Record]) -> Result<PreviewResult> {
        self.compute(self.generation, config, records)
    }

    fn compute(
        &self,
        generation: u64,
        config: &ChartConfiguration,
        records: &[Record],
    ) -> Result<PreviewResult> {
        self.catalog.validate_configuration(config)?;
        let dataset = self.catalog.get_dataset(config.dataset_id())?;
        let now = self.reference_time.unwrap_or_else(Utc::now);
        let filtered = RecordFilter::new(dataset, config, now)?.apply(records);
        let mut output = self.aggregator.aggregate(&filtered, config)?;

        let mut truncated = false;
        if config.disclosure_level().active_sections().advanced {
            if let Some(cap) = self.settings.max_preview_points {
                truncated = output.points.len() > cap;
                output.points.truncate(cap);
            }
        }
        Ok(PreviewResult {
            generation,
            chart_type: config.chart_type().unwrap_or_else(|| infer_chart_type(config)),
            points: output.points,
            metadata: output.metadata,
            source_records: records.len(),
            filtered_records: filtered.len(),
            truncated,
            generated_at: Utc::now(),
        })
    }
}
