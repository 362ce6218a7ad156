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

//! Filter conditions, time ranges, and their evaluation against records.

use crate::catalog::{Dataset, Filter, FilterKind};
use crate::config::ChartConfiguration;
use crate::error::{AssignmentError, CatalogResult};
use crate::records::{field_datetime, field_number, field_text, parse_datetime, Record};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    Contains,
}
impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Equals,
        FilterOperator::NotEquals,
        FilterOperator::In,
        FilterOperator::NotIn,
        FilterOperator::GreaterThan,
        FilterOperator::GreaterThanOrEqual,
        FilterOperator::LessThan,
        FilterOperator::LessThanOrEqual,
        FilterOperator::Between,
        FilterOperator::Contains,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equals => "equals",
            FilterOperator::NotEquals => "not_equals",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
            FilterOperator::GreaterThan => "greater_than",
            FilterOperator::GreaterThanOrEqual => "greater_than_or_equal",
            FilterOperator::LessThan => "less_than",
            FilterOperator::LessThanOrEqual => "less_than_or_equal",
            FilterOperator::Between => "between",
            FilterOperator::Contains => "contains",
        }
    }
    pub fn supported_by(&self, kind: FilterKind) -> bool {
        use FilterOperator::*;
        match kind {
            FilterKind::Select | FilterKind::Multiselect => {
                matches!(self, Equals | NotEquals | In | NotIn)
            }
            FilterKind::Text => matches!(self, Equals | NotEquals | Contains),
            FilterKind::Numeric => !matches!(self, In | NotIn | Contains),
            FilterKind::Daterange => matches!(
                self,
                GreaterThan | GreaterThanOrEqual | LessThan | LessThanOrEqual | Between
            ),
        }
    }
    fn is_ordering(&self) -> bool {
        matches!(
            self,
            FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
        )
    }
}
impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for FilterOperator {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase();
        let alias = match normalised.as_str() {
            "=" | "==" | "eq" => Some(FilterOperator::Equals),
            "!=" | "<>" | "neq" => Some(FilterOperator::NotEquals),
            ">" | "gt" => Some(FilterOperator::GreaterThan),
            ">=" | "gte" => Some(FilterOperator::GreaterThanOrEqual),
            "<" | "lt" => Some(FilterOperator::LessThan),
            "<=" | "lte" => Some(FilterOperator::LessThanOrEqual),
            _ => None,
        };
        alias
            .or_else(|| {
                FilterOperator::ALL
                    .iter()
                    .copied()
                    .find(|op| op.as_str() == normalised)
            })
            .ok_or_else(|| format!("unknown filter operator '{s}'"))
    }
}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveFilter {
    pub filter_id: String,
    pub operator: FilterOperator,
    pub value: Value,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimeRange {
    /// `last_<n>_days`, evaluated against a reference instant.
    Relative { value: String },
    /// Inclusive calendar bounds.
    Absolute { start: String, end: String },
}
impl TimeRange {
    pub fn last_days(days: u32) -> Self {
        TimeRange::Relative {
            value: format!("last_{days}_days"),
        }
    }
    pub fn validate(&self) -> Result<(), AssignmentError> {
        let reference = DateTime::<Utc>::UNIX_EPOCH;
        match self.bounds(reference) {
            Some((start, end)) if start <= end => Ok(()),
            Some(_) => Err(invalid_value("time_range", "start is after end")),
            None => Err(invalid_value(
                "time_range",
                "expected last_<n>_days or YYYY-MM-DD / RFC 3339 bounds",
            )),
        }
    }
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            TimeRange::Relative { value } => {
                let days: i64 = value
                    .strip_prefix("last_")?
                    .strip_suffix("_days")?
                    .parse()
                    .ok()?;
                if days <= 0 {
                    return None;
                }
                let start = now.checked_sub_signed(Duration::try_days(days)?)?;
                Some((start, now))
            }
            TimeRange::Absolute { start, end } => {
                let start = parse_datetime(start)?;
                let end = parse_end_bound(end)?;
                Some((start, end))
            }
        }
    }
}
/// A bare date as an upper bound covers the whole day.
fn parse_end_bound(value: &str) -> Option<DateTime<Utc>> {
    match NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(23, 59, 59).map(|dt| dt.and_utc()),
        Err(_) => parse_datetime(value),
    }
}
fn invalid_value(filter: &str, reason: &str) -> AssignmentError {
    AssignmentError::InvalidFilterValue {
        filter: filter.to_string(),
        reason: reason.to_string(),
    }
}

/// Checks that `operator` fits the filter kind and that `value` has the
/// shape the operator needs.
pub fn validate_filter(
    filter: &Filter,
    operator: FilterOperator,
    value: &Value,
) -> Result<(), AssignmentError> {
    if !operator.supported_by(filter.kind) {
        return Err(AssignmentError::IncompatibleFilterOperator {
            filter: filter.id.clone(),
            kind: filter.kind,
            operator,
        });
    }
    let invalid = |reason: &str| invalid_value(&filter.id, reason);
    match operator {
        FilterOperator::In | FilterOperator::NotIn => {
            let items = value
                .as_array()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| invalid("expected a non-empty array"))?;
            for item in items {
                let text = scalar_text(item).ok_or_else(|| invalid("array items must be scalars"))?;
                if !filter.allows_option(&text) {
                    return Err(invalid(&format!("'{text}' is not an option")));
                }
            }
        }
        FilterOperator::Equals | FilterOperator::NotEquals => {
            let text = scalar_text(value).ok_or_else(|| invalid("expected a scalar value"))?;
            if !filter.allows_option(&text) {
                return Err(invalid(&format!("'{text}' is not an option")));
            }
            if filter.kind == FilterKind::Numeric && value_number(value).is_none() {
                return Err(invalid("expected a number"));
            }
        }
        FilterOperator::Contains => {
            value
                .as_str()
                .ok_or_else(|| invalid("expected a string"))?;
        }
        FilterOperator::Between => {
            let (low, high) = range_pair(value)
                .ok_or_else(|| invalid("expected [low, high] or {min, max}"))?;
            let ordered = match filter.kind {
                FilterKind::Daterange => match (value_datetime(low), value_datetime(high)) {
                    (Some(low), Some(high)) => low <= high,
                    _ => return Err(invalid("bounds must be dates")),
                },
                _ => match (value_number(low), value_number(high)) {
                    (Some(low), Some(high)) => low <= high,
                    _ => return Err(invalid("bounds must be numbers")),
                },
            };
            if !ordered {
                return Err(invalid("lower bound exceeds upper bound"));
            }
        }
        _ => {
            let parsed = match filter.kind {
                FilterKind::Daterange => value_datetime(value).is_some(),
                _ => value_number(value).is_some(),
            };
            if !parsed {
                return Err(invalid("expected a comparable value"));
            }
        }
    }
    Ok(())
}
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
fn value_datetime(value: &Value) -> Option<DateTime<Utc>> {
    value.as_str().and_then(parse_datetime)
}
fn range_pair(value: &Value) -> Option<(&Value, &Value)> {
    match value {
        Value::Array(items) if items.len() == 2 => Some((&items[0], &items[1])),
        Value::Object(map) => {
            let low = map.get("min").or_else(|| map.get("start"))?;
            let high = map.get("max").or_else(|| map.get("end"))?;
            Some((low, high))
        }
        _ => None,
    }
}

/// Record predicate built from the sections a configuration has enabled.
#[derive(Debug)]
pub struct RecordFilter<'a> {
    conditions: Vec<(&'a Filter, &'a ActiveFilter)>,
    time_window: Option<(&'a str, DateTime<Utc>, DateTime<Utc>)>,
}
impl<'a> RecordFilter<'a> {
    pub fn new(
        dataset: &'a Dataset,
        config: &'a ChartConfiguration,
        now: DateTime<Utc>,
    ) -> CatalogResult<Self> {
        let sections = config.disclosure_level().active_sections();
        let mut conditions = Vec::new();
        if sections.filters {
            for active in config.active_filters() {
                conditions.push((dataset.find_filter(&active.filter_id)?, active));
            }
        }
        let time_window = if sections.time_range {
            match (config.time_range(), dataset.date_range_filter()) {
                (Some(range), Some(date_filter)) => range
                    .bounds(now)
                    .map(|(start, end)| (date_filter.technical_name.as_str(), start, end)),
                _ => None,
            }
        } else {
            None
        };
        Ok(Self {
            conditions,
            time_window,
        })
    }
    pub fn is_passthrough(&self) -> bool {
        self.conditions.is_empty() && self.time_window.is_none()
    }
    pub fn matches(&self, record: &Record) -> bool {
        if let Some((column, start, end)) = &self.time_window {
            let within = field_datetime(record, column)
                .is_some_and(|at| *start <= at && at <= *end);
            if !within {
                return false;
            }
        }
        self.conditions
            .iter()
            .all(|(filter, active)| condition_matches(filter, active, record))
    }
    pub fn apply<'r, R: Borrow<Record>>(&self, records: &'r [R]) -> Vec<&'r Record> {
        let kept: Vec<&Record> = records
            .iter()
            .map(Borrow::borrow)
            .filter(|record| self.matches(record))
            .collect();
        if !self.is_passthrough() {
            debug!(
                input = records.len(),
                kept = kept.len(),
                conditions = self.conditions.len(),
                "Records filtered"
            );
        }
        kept
    }
}
fn condition_matches(filter: &Filter, active: &ActiveFilter, record: &Record) -> bool {
    let column = filter.technical_name.as_str();
    let Some(text) = field_text(record, column) else {
        return false;
    };
    let value = &active.value;
    match active.operator {
        FilterOperator::Equals => scalar_text(value).is_some_and(|v| values_equal(&text, &v)),
        FilterOperator::NotEquals => scalar_text(value).is_some_and(|v| !values_equal(&text, &v)),
        FilterOperator::In => value
            .as_array()
            .is_some_and(|items| items.iter().filter_map(scalar_text).any(|v| values_equal(&text, &v))),
        FilterOperator::NotIn => value.as_array().is_some_and(|items| {
            !items
                .iter()
                .filter_map(scalar_text)
                .any(|v| values_equal(&text, &v))
        }),
        FilterOperator::Contains => value
            .as_str()
            .is_some_and(|needle| text.to_lowercase().contains(&needle.to_lowercase())),
        FilterOperator::Between => range_pair(value).is_some_and(|(low, high)| {
            compare(filter.kind, record, column, low).is_some_and(|o| o.is_ge())
                && compare(filter.kind, record, column, high).is_some_and(|o| o.is_le())
        }),
        op if op.is_ordering() => {
            compare(filter.kind, record, column, value).is_some_and(|ordering| match op {
                FilterOperator::GreaterThan => ordering.is_gt(),
                FilterOperator::GreaterThanOrEqual => ordering.is_ge(),
                FilterOperator::LessThan => ordering.is_lt(),
                _ => ordering.is_le(),
            })
        }
        _ => false,
    }
}
/// Numeric values compare numerically so that `"30"` equals `30.0`.
fn values_equal(record_text: &str, expected: &str) -> bool {
    match (record_text.trim().parse::<f64>(), expected.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => record_text == expected,
    }
}
fn compare(
    kind: FilterKind,
    record: &Record,
    column: &str,
    bound: &Value,
) -> Option<std::cmp::Ordering> {
    match kind {
        FilterKind::Daterange => {
            let at = field_datetime(record, column)?;
            Some(at.cmp(&value_datetime(bound)?))
        }
        _ => field_number(record, column)?.partial_cmp(&value_number(bound)?),
    }
}
