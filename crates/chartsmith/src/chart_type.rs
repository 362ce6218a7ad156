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

use crate::config::{AssignedField, ChartConfiguration};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Area,
    Pie,
    Table,
    Mixed,
}
impl ChartType {
    pub const ALL: [ChartType; 6] = [
        ChartType::Line,
        ChartType::Bar,
        ChartType::Area,
        ChartType::Pie,
        ChartType::Table,
        ChartType::Mixed,
    ];
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Area => "area",
            ChartType::Pie => "pie",
            ChartType::Table => "table",
            ChartType::Mixed => "mixed",
        }
    }
    pub fn description(&self) -> &'static str {
        match self {
            ChartType::Line => "Show trends over time",
            ChartType::Bar => "Compare categories",
            ChartType::Area => "Show cumulative trends",
            ChartType::Pie => "Show proportions",
            ChartType::Table => "Raw data view",
            ChartType::Mixed => "Compare several metrics at once",
        }
    }
}
impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
impl FromStr for ChartType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChartType::ALL
            .iter()
            .copied()
            .find(|chart| chart.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown chart type '{s}'"))
    }
}

/// Recommends a chart type for the current slot assignment.
///
/// Rules are checked in order and the first match wins:
/// an empty slot gives `table`, any temporal dimension gives `line` (or
/// `mixed` with several metrics), categorical dimensions give `bar` for a
/// single metric over a single category and `mixed` for several metrics,
/// and everything else falls back to `bar`.
pub fn infer_chart_type(config: &ChartConfiguration) -> ChartType {
    infer_from_fields(config.assigned_metrics(), config.assigned_dimensions())
}
pub fn infer_from_fields(metrics: &[AssignedField], dimensions: &[AssignedField]) -> ChartType {
    if metrics.is_empty() || dimensions.is_empty() {
        return ChartType::Table;
    }
    let has_temporal = dimensions
        .iter()
        .any(|d| d.dimension_kind.is_some_and(|kind| kind.is_temporal()));
    if has_temporal {
        return if metrics.len() > 1 {
            ChartType::Mixed
        } else {
            ChartType::Line
        };
    }
    let categorical_count = dimensions
        .iter()
        .filter(|d| d.dimension_kind.is_some_and(|kind| kind.is_categorical()))
        .count();
    if categorical_count > 0 {
        if metrics.len() == 1 && categorical_count == 1 {
            return ChartType::Bar;
        }
        if metrics.len() > 1 {
            return ChartType::Mixed;
        }
    }
    ChartType::Bar
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Mixed".parse::<ChartType>(), Ok(ChartType::Mixed));
        assert!("scatter".parse::<ChartType>().is_err());
        assert_eq!(ChartType::Area.to_string(), "area");
    }

    #[test]
    fn empty_slots_fall_back_to_table() {
        assert_eq!(infer_from_fields(&[], &[]), ChartType::Table);
    }
}
