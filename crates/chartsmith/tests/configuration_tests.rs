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

use chartsmith::{
    ChartBuilderError, ChartType, ConfigurationState, ErrorKind, FieldRole, FilterOperator, Slot,
    TimeRange,
};
use common::{builtin_catalog, shared_id_catalog};
use serde_json::json;

fn session() -> ConfigurationState {
    let mut state = ConfigurationState::new(builtin_catalog());
    state.select_dataset("test_execution").unwrap();
    state
}

#[test]
fn test_select_dataset_discards_assignments() {
    let mut state = session();
    state.set_disclosure_level(2).unwrap();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    state
        .assign_field("environment", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();
    state
        .add_filter("status_filter", FilterOperator::In, json!(["PASSED"]))
        .unwrap();

    let config = state.select_dataset("defect_tracking").unwrap();
    assert_eq!(config.dataset_id(), "defect_tracking");
    assert!(config.assigned_metrics().is_empty());
    assert!(config.assigned_dimensions().is_empty());
    assert!(config.active_filters().is_empty());
    assert_eq!(config.chart_type(), None);
    assert_eq!(config.disclosure_level().value(), 2);
}

#[test]
fn test_unknown_dataset_keeps_previous_configuration() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let err = state.select_dataset("nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let config = state.configuration().unwrap();
    assert_eq!(config.dataset_id(), "test_execution");
    assert_eq!(config.assigned_metrics().len(), 1);
}

#[test]
fn test_operations_require_selected_dataset() {
    let mut state = ConfigurationState::new(builtin_catalog());
    let err = state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);
    assert!(state.configuration().is_none());
}

#[test]
fn test_field_occupies_at_most_one_slot() {
    let mut state = ConfigurationState::new(shared_id_catalog());
    state.select_dataset("ops").unwrap();
    state
        .assign_field("duration", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let config = state
        .assign_field("duration", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();

    assert!(config.assigned_metrics().is_empty());
    assert_eq!(config.assigned_dimensions().len(), 1);
    assert_eq!(config.slot_of("duration"), Some(Slot::Dimensions));
    assert_eq!(config.assigned_dimensions()[0].technical_name, "duration_bucket");
}

#[test]
fn test_reassigning_does_not_duplicate() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let config = state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    assert_eq!(config.assigned_metrics().len(), 1);
}

#[test]
fn test_role_slot_mismatch_keeps_state() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let before = state.configuration().cloned().unwrap();

    let err = state
        .assign_field("environment", FieldRole::Dimension, Slot::Metrics)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);
    assert_eq!(state.configuration(), Some(&before));
}

#[test]
fn test_field_from_other_dataset_is_rejected() {
    let mut state = ConfigurationState::new(builtin_catalog());
    state.select_dataset("defect_tracking").unwrap();

    let foreign = state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap_err();
    assert_eq!(foreign.kind(), ErrorKind::InvalidAssignment);
    assert!(foreign.to_string().contains("test_execution"));

    let missing = state
        .assign_field("made_up", FieldRole::Metric, Slot::Metrics)
        .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::NotFound);
    assert!(state.configuration().unwrap().assigned_metrics().is_empty());
}

#[test]
fn test_temporal_with_two_metrics_then_one() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    state
        .assign_field("avg_duration", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let config = state
        .assign_field("execution_date", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();
    assert_eq!(config.chart_type(), Some(ChartType::Mixed));

    let config = state.remove_field("avg_duration", Slot::Metrics).unwrap();
    assert_eq!(config.chart_type(), Some(ChartType::Line));
}

#[test]
fn test_chart_type_override_lasts_until_next_field_change() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    state
        .assign_field("environment", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();
    let config = state.set_chart_type(ChartType::Pie).unwrap();
    assert_eq!(config.chart_type(), Some(ChartType::Pie));

    state.set_disclosure_level(3).unwrap();
    assert_eq!(state.configuration().unwrap().chart_type(), Some(ChartType::Pie));

    let config = state
        .assign_field("project", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();
    assert_eq!(config.chart_type(), Some(ChartType::Bar));
}

#[test]
fn test_removing_absent_field_is_noop() {
    let mut state = session();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let before = state.configuration().cloned().unwrap();
    let config = state.remove_field("pass_rate", Slot::Dimensions).unwrap();
    assert_eq!(config, &before);
}

#[test]
fn test_filter_operators_follow_filter_kind() {
    let mut state = session();
    let err = state
        .add_filter("status_filter", FilterOperator::Contains, json!("PASS"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);

    let err = state
        .add_filter("status_filter", FilterOperator::In, json!(["PASSED", "FLAKY"]))
        .unwrap_err();
    assert!(err.to_string().contains("FLAKY"));

    let err = state
        .add_filter("duration_filter", FilterOperator::Between, json!([100, 10]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);

    state
        .add_filter("status_filter", FilterOperator::In, json!(["PASSED"]))
        .unwrap();
    let config = state
        .add_filter("status_filter", FilterOperator::NotIn, json!(["ERROR"]))
        .unwrap();
    assert_eq!(config.active_filters().len(), 1);
    assert_eq!(config.active_filters()[0].operator, FilterOperator::NotIn);

    let err = state
        .add_filter("priority_filter", FilterOperator::In, json!(["High"]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_remove_filter() {
    let mut state = session();
    state
        .add_filter("duration_filter", FilterOperator::LessThan, json!(60))
        .unwrap();
    let config = state.remove_filter("duration_filter").unwrap();
    assert!(config.active_filters().is_empty());
    assert_eq!(
        state.remove_filter("ghost").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn test_time_range_validation() {
    let mut state = session();
    let config = state.set_time_range(Some(TimeRange::last_days(7))).unwrap();
    assert_eq!(config.time_range(), Some(&TimeRange::last_days(7)));

    let err = state
        .set_time_range(Some(TimeRange::Absolute {
            start: "2024-06-01".to_string(),
            end: "2024-05-01".to_string(),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);
    assert_eq!(
        state.configuration().unwrap().time_range(),
        Some(&TimeRange::last_days(7))
    );

    let config = state.set_time_range(None).unwrap();
    assert!(config.time_range().is_none());
}

#[test]
fn test_oversized_relative_range_is_rejected() {
    let mut state = session();
    state.set_time_range(Some(TimeRange::last_days(7))).unwrap();
    let err = state
        .set_time_range(Some(TimeRange::Relative {
            value: "last_9999999999999_days".to_string(),
        }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidAssignment);
    assert_eq!(
        state.configuration().unwrap().time_range(),
        Some(&TimeRange::last_days(7))
    );
}

#[test]
fn test_require_complete_names_missing_slot() {
    let mut state = session();
    let err = state.configuration().unwrap().require_complete().unwrap_err();
    assert!(err.to_string().contains("no metric assigned"));
    assert_eq!(
        ChartBuilderError::from(err).kind(),
        ErrorKind::IncompleteConfiguration
    );

    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let err = state.configuration().unwrap().require_complete().unwrap_err();
    assert!(err.to_string().contains("no dimension assigned"));

    let config = state
        .assign_field("environment", FieldRole::Dimension, Slot::Dimensions)
        .unwrap();
    assert!(config.require_complete().is_ok());
}

#[test]
fn test_disclosure_level_is_clamped() {
    let mut state = session();
    assert_eq!(state.set_disclosure_level(0).unwrap().disclosure_level().value(), 1);
    assert_eq!(state.set_disclosure_level(9).unwrap().disclosure_level().value(), 4);
    let sections = state.configuration().unwrap().disclosure_level().active_sections();
    assert!(sections.filters && sections.time_range && sections.advanced);
}

#[test]
fn test_reset_keeps_dataset_and_restores_level() {
    let mut state = session();
    state.set_disclosure_level(3).unwrap();
    state
        .assign_field("pass_rate", FieldRole::Metric, Slot::Metrics)
        .unwrap();
    let config = state.reset().unwrap();
    assert_eq!(config.dataset_id(), "test_execution");
    assert!(config.assigned_metrics().is_empty());
    assert_eq!(config.disclosure_level().value(), 1);
}
