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

#![allow(dead_code)]

use chartsmith::records::Record;
use chartsmith::{ChartConfiguration, ConfigurationState, FieldCatalog, FieldRole, Slot};
use serde_json::Value;
use std::sync::Arc;

/// Two small datasets where `duration` is both a metric and a dimension of `ops`.
pub const SHARED_ID_CATALOG: &str = r#"
datasets:
  - id: ops
    name: Operations
    businessDescription: Operational runs
    category: execution
    metrics:
      - id: duration
        name: Duration
        businessDescription: Run duration
        technicalName: duration_seconds
        expression: "AVG(duration_seconds)"
        valueType: duration
        displayFormat: "0"
        category: performance
      - id: pass_rate
        name: Pass Rate %
        businessDescription: Share of passing runs
        technicalName: pass_rate_percentage
        expression: "COUNT(*)"
        valueType: percentage
        displayFormat: "0.1%"
        category: quality
    dimensions:
      - id: duration
        name: Duration Bucket
        businessDescription: Bucketed duration
        technicalName: duration_bucket
        kind: ordinal
        category: classification
      - id: run_day
        name: Run Day
        businessDescription: Day of the run
        technicalName: run_day
        kind: temporal
        category: time
  - id: audits
    name: Audits
    businessDescription: Audit trail
    category: coverage
    metrics:
      - id: audit_count
        name: Audits
        businessDescription: Number of audits
        technicalName: audit_count
        expression: "COUNT(*)"
        valueType: count
        displayFormat: "0"
        category: coverage
    dimensions:
      - id: auditor
        name: Auditor
        businessDescription: Who audited
        technicalName: auditor
        kind: categorical
        category: team
"#;

pub fn builtin_catalog() -> Arc<FieldCatalog> {
    Arc::new(FieldCatalog::builtin().expect("built-in catalog loads"))
}

pub fn shared_id_catalog() -> Arc<FieldCatalog> {
    Arc::new(FieldCatalog::from_yaml_str(SHARED_ID_CATALOG).expect("test catalog loads"))
}

pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record must be a JSON object")
}

pub fn records(values: Vec<Value>) -> Vec<Record> {
    values.into_iter().map(record).collect()
}

/// Builds a configuration on `dataset` with the given fields assigned in order.
pub fn configured(
    catalog: &Arc<FieldCatalog>,
    dataset: &str,
    metrics: &[&str],
    dimensions: &[&str],
) -> ChartConfiguration {
    let mut state = ConfigurationState::new(Arc::clone(catalog));
    state.select_dataset(dataset).unwrap();
    for metric in metrics {
        state.assign_field(metric, FieldRole::Metric, Slot::Metrics).unwrap();
    }
    for dimension in dimensions {
        state
            .assign_field(dimension, FieldRole::Dimension, Slot::Dimensions)
            .unwrap();
    }
    state.configuration().cloned().unwrap()
}
