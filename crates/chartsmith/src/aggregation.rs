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

//! Grouping of raw records into chart points.

use crate::config::{AssignedField, ChartConfiguration};
use crate::error::{AggregationError, AggregationResult};
use crate::records::{field_number, field_text, Record};
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tracing::debug;

pub const GROUP_SEPARATOR: &str = " - ";
const STATUS_COLUMN: &str = "status";
const DURATION_COLUMN: &str = "duration_seconds";
const TEST_TYPE_COLUMN: &str = "test_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricComputation {
    PassRate,
    FailureRate,
    AvgDuration,
    TotalExecutions,
    AutomationCoverage,
}
impl MetricComputation {
    pub fn for_metric_id(id: &str) -> Option<Self> {
        match id {
            "pass_rate" => Some(Self::PassRate),
            "failure_rate" => Some(Self::FailureRate),
            "avg_duration" => Some(Self::AvgDuration),
            "total_executions" => Some(Self::TotalExecutions),
            "automation_coverage" => Some(Self::AutomationCoverage),
            _ => None,
        }
    }

    /// Computes the metric over a non-empty group.
    pub fn compute(&self, group: &[&Record]) -> f64 {
        let total = group.len();
        if total == 0 {
            return 0.0;
        }
        let share = |predicate: &dyn Fn(&Record) -> bool| {
            let hits = group.iter().filter(|record| predicate(**record)).count();
            (hits as f64 / total as f64 * 100.0).round()
        };
        match self {
            Self::PassRate => share(&|record| status_is(record, &["PASSED"])),
            Self::FailureRate => share(&|record| status_is(record, &["FAILED", "ERROR"])),
            Self::AutomationCoverage => share(&|record| {
                field_text(record, TEST_TYPE_COLUMN).as_deref() == Some("automated")
            }),
            Self::AvgDuration => {
                let sum: f64 = group
                    .iter()
                    .map(|record| field_number(record, DURATION_COLUMN).unwrap_or(0.0))
                    .sum();
                (sum / total as f64).round()
            }
            Self::TotalExecutions => total as f64,
        }
    }
}
fn status_is(record: &Record, accepted: &[&str]) -> bool {
    field_text(record, STATUS_COLUMN).is_some_and(|status| accepted.contains(&status.as_str()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedPoint {
    pub group_label: String,
    /// Metric values in slot order, keyed by metric id (never the display
    /// name).
    pub values: IndexMap<String, f64>,
}
impl AggregatedPoint {
    pub fn value(&self, metric_id: &str) -> Option<f64> {
        self.values.get(metric_id).copied()
    }
}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationMetadata {
    pub input_count: usize,
    /// Number of groups produced, before any preview point cap.
    pub output_count: usize,
}
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutput {
    pub points: Vec<AggregatedPoint>,
    pub metadata: AggregationMetadata,
}

/// Composite label of the record's values for `dimensions`.
pub fn group_label(record: &Record, dimensions: &[AssignedField]) -> String {
    dimensions
        .iter()
        .map(|dimension| {
            field_text(record, &dimension.technical_name)
                .unwrap_or_else(|| format!("Unknown {}", dimension.name))
        })
        .collect::<Vec<_>>()
        .join(GROUP_SEPARATOR)
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    parallel_threshold: usize,
}
impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
impl Aggregator {
    pub fn new() -> Self {
        Self {
            parallel_threshold: 10_000,
        }
    }
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn aggregate<R: Borrow<Record>>(
        &self,
        records: &[R],
        config: &ChartConfiguration,
    ) -> AggregationResult<AggregationOutput> {
        let metadata = AggregationMetadata {
            input_count: records.len(),
            output_count: 0,
        };
        if !config.is_complete() {
            return Ok(AggregationOutput {
                points: Vec::new(),
                metadata,
            });
        }
        let computations = config
            .assigned_metrics()
            .iter()
            .map(|metric| {
                MetricComputation::for_metric_id(&metric.field_id)
                    .map(|computation| (metric.field_id.as_str(), computation))
                    .ok_or_else(|| AggregationError::UnknownMetric {
                        id: metric.field_id.clone(),
                        name: metric.name.clone(),
                    })
            })
            .collect::<AggregationResult<Vec<_>>>()?;

        let mut groups: IndexMap<String, Vec<&Record>> = IndexMap::new();
        for record in records {
            let record = record.borrow();
            groups
                .entry(group_label(record, config.assigned_dimensions()))
                .or_default()
                .push(record);
        }
        let mut groups: Vec<(String, Vec<&Record>)> = groups.into_iter().collect();
        groups.sort_by(|(a, _), (b, _)| a.cmp(b));

        let build_point = |(group_label, members): (String, Vec<&Record>)| AggregatedPoint {
            values: computations
                .iter()
                .map(|(id, computation)| ((*id).to_string(), computation.compute(&members)))
                .collect(),
            group_label,
        };
        let points: Vec<AggregatedPoint> = if records.len() > self.parallel_threshold {
            groups.into_par_iter().map(build_point).collect()
        } else {
            groups.into_iter().map(build_point).collect()
        };
        debug!(
            dataset = %config.dataset_id(),
            input = records.len(),
            groups = points.len(),
            "Aggregated records"
        );
        Ok(AggregationOutput {
            metadata: AggregationMetadata {
                output_count: points.len(),
                ..metadata
            },
            points,
        })
    }
}

/// Aggregates with the default [`Aggregator`].
pub fn aggregate<R: Borrow<Record>>(
    records: &[R],
    config: &ChartConfiguration,
) -> AggregationResult<AggregationOutput> {
    Aggregator::new().aggregate(records, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn rates_round_half_up() {
        let records: Vec<Record> = ["PASSED", "PASSED", "PASSED", "FAILED", "FAILED", "FAILED", "FAILED", "FAILED"]
            .iter()
            .map(|status| record(json!({ "status": status })))
            .collect();
        let group: Vec<&Record> = records.iter().collect();
        assert_eq!(MetricComputation::PassRate.compute(&group), 38.0);
        assert_eq!(MetricComputation::FailureRate.compute(&group), 63.0);
    }

    #[test]
    fn missing_duration_counts_as_zero() {
        let records = [
            record(json!({ "duration_seconds": 10 })),
            record(json!({ "duration_seconds": 21 })),
            record(json!({})),
        ];
        let group: Vec<&Record> = records.iter().collect();
        assert_eq!(MetricComputation::AvgDuration.compute(&group), 10.0);
    }

    #[test]
    fn automation_match_is_lowercase_literal() {
        let records = [
            record(json!({ "test_type": "automated" })),
            record(json!({ "test_type": "Automated" })),
        ];
        let group: Vec<&Record> = records.iter().collect();
        assert_eq!(MetricComputation::AutomationCoverage.compute(&group), 50.0);
    }
}
