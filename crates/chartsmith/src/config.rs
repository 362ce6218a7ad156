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

//! Mutable chart configuration owned by one builder session.
//!
//! Every operation either returns the updated configuration or rejects the
//! input and leaves the previous configuration untouched. Field assignment
//! and removal re-run chart-type inference before returning.

use crate::catalog::{Dataset, Dimension, DimensionKind, FieldCatalog, Metric};
use crate::chart_type::{infer_chart_type, ChartType};
use crate::error::{
    AggregationError, AggregationResult, AssignmentError, ChartBuilderError, Result,
};
use crate::filtering::{validate_filter, ActiveFilter, FilterOperator, TimeRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldRole {
    Metric,
    Dimension,
}
impl fmt::Display for FieldRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldRole::Metric => f.write_str("metric"),
            FieldRole::Dimension => f.write_str("dimension"),
        }
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Metrics,
    Dimensions,
}
impl Slot {
    pub fn for_role(role: FieldRole) -> Self {
        match role {
            FieldRole::Metric => Slot::Metrics,
            FieldRole::Dimension => Slot::Dimensions,
        }
    }
    pub fn accepts(&self, role: FieldRole) -> bool {
        *self == Slot::for_role(role)
    }
}
impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Metrics => f.write_str("metrics"),
            Slot::Dimensions => f.write_str("dimensions"),
        }
    }
}

/// A catalog field placed into a slot, with a snapshot of the catalog
/// attributes that inference and aggregation read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedField {
    pub field_id: String,
    pub dataset_id: String,
    pub role: FieldRole,
    pub slot: Slot,
    pub name: String,
    pub technical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_kind: Option<DimensionKind>,
}
impl AssignedField {
    pub fn from_metric(dataset: &Dataset, metric: &Metric) -> Self {
        Self {
            field_id: metric.id.clone(),
            dataset_id: dataset.id.clone(),
            role: FieldRole::Metric,
            slot: Slot::Metrics,
            name: metric.name.clone(),
            technical_name: metric.technical_name.clone(),
            dimension_kind: None,
        }
    }
    pub fn from_dimension(dataset: &Dataset, dimension: &Dimension) -> Self {
        Self {
            field_id: dimension.id.clone(),
            dataset_id: dataset.id.clone(),
            role: FieldRole::Dimension,
            slot: Slot::Dimensions,
            name: dimension.name.clone(),
            technical_name: dimension.technical_name.clone(),
            dimension_kind: Some(dimension.kind),
        }
    }
}

/// Progressive disclosure gate, always within `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct DisclosureLevel(u8);
impl DisclosureLevel {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;
    pub fn clamped(level: i64) -> Self {
        Self(level.clamp(i64::from(Self::MIN), i64::from(Self::MAX)) as u8)
    }
    pub fn value(&self) -> u8 {
        self.0
    }
    pub fn label(&self) -> &'static str {
        match self.0 {
            1 => "Basic",
            2 => "Intermediate",
            3 => "Advanced",
            _ => "Expert",
        }
    }
    pub fn active_sections(&self) -> ActiveSections {
        ActiveSections {
            filters: self.0 >= 2,
            time_range: self.0 >= 2,
            advanced: self.0 >= 3,
        }
    }
}
impl Default for DisclosureLevel {
    fn default() -> Self {
        Self(Self::MIN)
    }
}
impl TryFrom<i64> for DisclosureLevel {
    type Error = String;
    fn try_from(level: i64) -> std::result::Result<Self, Self::Error> {
        Ok(Self::clamped(level))
    }
}
impl From<DisclosureLevel> for u8 {
    fn from(level: DisclosureLevel) -> Self {
        level.0
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActiveSections {
    pub filters: bool,
    pub time_range: bool,
    pub advanced: bool,
}
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfiguration {
    dataset_id: String,
    assigned_metrics: Vec<AssignedField>,
    assigned_dimensions: Vec<AssignedField>,
    active_filters: Vec<ActiveFilter>,
    chart_type: Option<ChartType>,
    disclosure_level: DisclosureLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_range: Option<TimeRange>,
}
impl ChartConfiguration {
    fn new(dataset_id: String, disclosure_level: DisclosureLevel) -> Self {
        Self {
            dataset_id,
            assigned_metrics: Vec::new(),
            assigned_dimensions: Vec::new(),
            active_filters: Vec::new(),
            chart_type: None,
            disclosure_level,
            time_range: None,
        }
    }
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }
    pub fn assigned_metrics(&self) -> &[AssignedField] {
        &self.assigned_metrics
    }
    pub fn assigned_dimensions(&self) -> &[AssignedField] {
        &self.assigned_dimensions
    }
    pub fn slot(&self, slot: Slot) -> &[AssignedField] {
        match slot {
            Slot::Metrics => &self.assigned_metrics,
            Slot::Dimensions => &self.assigned_dimensions,
        }
    }
    pub fn active_filters(&self) -> &[ActiveFilter] {
        &self.active_filters
    }
    pub fn chart_type(&self) -> Option<ChartType> {
        self.chart_type
    }
    pub fn disclosure_level(&self) -> DisclosureLevel {
        self.disclosure_level
    }
    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }
    /// Both slots hold at least one field.
    pub fn is_complete(&self) -> bool {
        !self.assigned_metrics.is_empty() && !self.assigned_dimensions.is_empty()
    }
    /// Names the first empty slot, metrics before dimensions.
    pub fn require_complete(&self) -> AggregationResult<()> {
        if self.assigned_metrics.is_empty() {
            return Err(AggregationError::IncompleteConfiguration { missing: "metric" });
        }
        if self.assigned_dimensions.is_empty() {
            return Err(AggregationError::IncompleteConfiguration {
                missing: "dimension",
            });
        }
        Ok(())
    }
    /// The slot currently holding `field_id`, if any.
    pub fn slot_of(&self, field_id: &str) -> Option<Slot> {
        if self.assigned_metrics.iter().any(|f| f.field_id == field_id) {
            Some(Slot::Metrics)
        } else if self.assigned_dimensions.iter().any(|f| f.field_id == field_id) {
            Some(Slot::Dimensions)
        } else {
            None
        }
    }
    fn slot_mut(&mut self, slot: Slot) -> &mut Vec<AssignedField> {
        match slot {
            Slot::Metrics => &mut self.assigned_metrics,
            Slot::Dimensions => &mut self.assigned_dimensions,
        }
    }
    fn detach(&mut self, field_id: &str) {
        self.assigned_metrics.retain(|f| f.field_id != field_id);
        self.assigned_dimensions.retain(|f| f.field_id != field_id);
    }
    fn refresh_chart_type(&mut self) {
        self.chart_type = Some(infer_chart_type(self));
    }
}

/// Owns the active configuration and applies user edits to it.
#[derive(Debug, Clone)]
pub struct ConfigurationState {
    catalog: Arc<FieldCatalog>,
    current: Option<ChartConfiguration>,
    default_level: DisclosureLevel,
}
impl ConfigurationState {
    pub fn new(catalog: Arc<FieldCatalog>) -> Self {
        Self {
            catalog,
            current: None,
            default_level: DisclosureLevel::default(),
        }
    }
    pub fn with_default_level(mut self, level: DisclosureLevel) -> Self {
        self.default_level = level;
        self
    }
    pub fn catalog(&self) -> &Arc<FieldCatalog> {
        &self.catalog
    }
    pub fn configuration(&self) -> Option<&ChartConfiguration> {
        self.current.as_ref()
    }
    pub fn active_dataset(&self) -> Option<&Dataset> {
        self.current
            .as_ref()
            .and_then(|config| self.catalog.get_dataset(&config.dataset_id).ok())
    }

    /// Binds a fresh, empty configuration to `dataset_id`.
    ///
    /// Assignments, filters and the time range are discarded; the disclosure
    /// level carries over.
    pub fn select_dataset(&mut self, dataset_id: &str) -> Result<&ChartConfiguration> {
        let dataset = self.catalog.get_dataset(dataset_id).map_err(|err| {
            warn!(dataset = dataset_id, "Rejected dataset selection: {err}");
            err
        })?;
        let level = self
            .current
            .as_ref()
            .map_or(self.default_level, |config| config.disclosure_level);
        let config = ChartConfiguration::new(dataset.id.clone(), level);
        debug!(dataset = dataset_id, "Dataset selected");
        Ok(self.current.insert(config))
    }
    pub fn assign_field(
        &mut self,
        field_id: &str,
        role: FieldRole,
        slot: Slot,
    ) -> Result<&ChartConfiguration> {
        if !slot.accepts(role) {
            warn!(field = field_id, %role, %slot, "Rejected assignment: role does not fit slot");
            return Err(AssignmentError::RoleSlotMismatch {
                field: field_id.to_string(),
                role,
                slot,
            }
            .into());
        }
        let catalog = Arc::clone(&self.catalog);
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        let dataset = catalog.get_dataset(&config.dataset_id)?;
        let lookup = match role {
            FieldRole::Metric => dataset
                .find_metric(field_id)
                .map(|metric| AssignedField::from_metric(dataset, metric)),
            FieldRole::Dimension => dataset
                .find_dimension(field_id)
                .map(|dimension| AssignedField::from_dimension(dataset, dimension)),
        };
        let assigned = lookup.map_err(|err| {
            let owners: Vec<String> = catalog
                .datasets_containing_field(field_id)
                .into_iter()
                .filter(|owner| *owner != dataset.id)
                .map(str::to_string)
                .collect();
            warn!(field = field_id, dataset = %dataset.id, "Rejected assignment: {err}");
            if owners.is_empty() {
                ChartBuilderError::from(err)
            } else {
                AssignmentError::ForeignField {
                    field: field_id.to_string(),
                    active: dataset.id.clone(),
                    owners,
                }
                .into()
            }
        })?;
        config.detach(field_id);
        config.slot_mut(slot).push(assigned);
        config.refresh_chart_type();
        debug!(
            field = field_id,
            %slot,
            chart_type = ?config.chart_type,
            "Field assigned"
        );
        Ok(config)
    }
    pub fn remove_field(&mut self, field_id: &str, slot: Slot) -> Result<&ChartConfiguration> {
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        let fields = config.slot_mut(slot);
        let before = fields.len();
        fields.retain(|f| f.field_id != field_id);
        if fields.len() != before {
            config.refresh_chart_type();
            debug!(field = field_id, %slot, chart_type = ?config.chart_type, "Field removed");
        }
        Ok(config)
    }
    /// Overrides the inferred chart type until the next field mutation.
    pub fn set_chart_type(&mut self, chart_type: ChartType) -> Result<&ChartConfiguration> {
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        config.chart_type = Some(chart_type);
        Ok(config)
    }
    /// Activates a filter, replacing any earlier condition on the same filter.
    pub fn add_filter(
        &mut self,
        filter_id: &str,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Result<&ChartConfiguration> {
        let catalog = Arc::clone(&self.catalog);
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        let filter = catalog.find_filter(&config.dataset_id, filter_id)?;
        validate_filter(filter, operator, &value).map_err(|err| {
            warn!(filter = filter_id, %operator, "Rejected filter: {err}");
            err
        })?;
        let active = ActiveFilter {
            filter_id: filter.id.clone(),
            operator,
            value,
        };
        match config
            .active_filters
            .iter_mut()
            .find(|existing| existing.filter_id == active.filter_id)
        {
            Some(existing) => *existing = active,
            None => config.active_filters.push(active),
        }
        debug!(filter = filter_id, %operator, "Filter added");
        Ok(config)
    }
    pub fn remove_filter(&mut self, filter_id: &str) -> Result<&ChartConfiguration> {
        let catalog = Arc::clone(&self.catalog);
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        catalog.find_filter(&config.dataset_id, filter_id)?;
        config.active_filters.retain(|f| f.filter_id != filter_id);
        Ok(config)
    }
    pub fn set_time_range(&mut self, range: Option<TimeRange>) -> Result<&ChartConfiguration> {
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        if let Some(range) = &range {
            range.validate()?;
        }
        config.time_range = range;
        Ok(config)
    }
    pub fn set_disclosure_level(&mut self, level: i64) -> Result<&ChartConfiguration> {
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        config.disclosure_level = DisclosureLevel::clamped(level);
        debug!(level = config.disclosure_level.value(), "Disclosure level changed");
        Ok(config)
    }
    /// Clears the configuration back to the empty state bound to the active dataset.
    pub fn reset(&mut self) -> Result<&ChartConfiguration> {
        let config = self
            .current
            .as_mut()
            .ok_or(AssignmentError::NoActiveDataset)?;
        *config = ChartConfiguration::new(config.dataset_id.clone(), self.default_level);
        debug!(dataset = %config.dataset_id, "Configuration reset");
        Ok(config)
    }
}
