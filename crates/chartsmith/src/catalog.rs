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

//! Static registry of datasets and the metrics, dimensions and filters each
//! one exposes.
//!
//! Field ids are only unique inside one dataset's metric, dimension or filter
//! set; lookups therefore always go through the owning [`Dataset`].

use crate::config::ChartConfiguration;
use crate::error::{CatalogError, CatalogResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

const BUILTIN_CATALOG: &str = include_str!("../config/qa_datasets.yml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricValueType {
    Percentage,
    Count,
    Duration,
    Ratio,
    Decimal,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Quality,
    Performance,
    Coverage,
    Productivity,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionKind {
    Categorical,
    Temporal,
    Ordinal,
}
impl DimensionKind {
    pub fn is_categorical(&self) -> bool {
        matches!(self, DimensionKind::Categorical)
    }
    pub fn is_temporal(&self) -> bool {
        matches!(self, DimensionKind::Temporal)
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimensionCategory {
    Time,
    Scope,
    Team,
    Environment,
    Classification,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Select,
    Multiselect,
    Daterange,
    Text,
    Numeric,
}
impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterKind::Select => "select",
            FilterKind::Multiselect => "multiselect",
            FilterKind::Daterange => "daterange",
            FilterKind::Text => "text",
            FilterKind::Numeric => "numeric",
        };
        f.write_str(name)
    }
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetCategory {
    Execution,
    Defects,
    Requirements,
    Coverage,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub id: String,
    pub name: String,
    pub business_description: String,
    pub technical_name: String,
    pub expression: String,
    pub value_type: MetricValueType,
    pub display_format: String,
    pub category: MetricCategory,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub id: String,
    pub name: String,
    pub business_description: String,
    pub technical_name: String,
    pub kind: DimensionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    pub category: DimensionCategory,
}
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub business_description: String,
    pub technical_name: String,
    pub kind: FilterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<FilterOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}
impl Filter {
    /// Whether `value` is one of the declared options. Filters without options accept anything.
    pub fn allows_option(&self, value: &str) -> bool {
        match &self.options {
            Some(options) => options.iter().any(|option| option.value == value),
            None => true,
        }
    }
}
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationships {
    #[serde(default)]
    pub related_datasets: Vec<String>,
    #[serde(default)]
    pub join_keys: IndexMap<String, String>,
}
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub business_description: String,
    pub category: DatasetCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_count: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub relationships: Relationships,
}
impl Dataset {
    pub fn find_metric(&self, id: &str) -> CatalogResult<&Metric> {
        self.metrics
            .iter()
            .find(|metric| metric.id == id)
            .ok_or_else(|| CatalogError::MetricNotFound {
                dataset: self.id.clone(),
                id: id.to_string(),
            })
    }
    pub fn find_dimension(&self, id: &str) -> CatalogResult<&Dimension> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.id == id)
            .ok_or_else(|| CatalogError::DimensionNotFound {
                dataset: self.id.clone(),
                id: id.to_string(),
            })
    }
    pub fn find_filter(&self, id: &str) -> CatalogResult<&Filter> {
        self.filters
            .iter()
            .find(|filter| filter.id == id)
            .ok_or_else(|| CatalogError::FilterNotFound {
                dataset: self.id.clone(),
                id: id.to_string(),
            })
    }
    /// The first `daterange` filter, whose column anchors time-range filtering.
    pub fn date_range_filter(&self) -> Option<&Filter> {
        self.filters
            .iter()
            .find(|filter| filter.kind == FilterKind::Daterange)
    }
    pub fn related_dataset_ids(&self) -> &[String] {
        &self.relationships.related_datasets
    }
    pub fn join_key(&self, related: &str) -> Option<&str> {
        self.relationships.join_keys.get(related).map(String::as_str)
    }
    fn check_unique_ids(&self) -> CatalogResult<()> {
        check_unique(&self.id, "metric", self.metrics.iter().map(|m| m.id.as_str()))?;
        check_unique(
            &self.id,
            "dimension",
            self.dimensions.iter().map(|d| d.id.as_str()),
        )?;
        check_unique(&self.id, "filter", self.filters.iter().map(|f| f.id.as_str()))
    }
}
fn check_unique<'a>(
    dataset: &str,
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
) -> CatalogResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateField {
                dataset: dataset.to_string(),
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}
#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    datasets: Vec<Dataset>,
}
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    datasets: Vec<Dataset>,
    dataset_by_id: HashMap<String, usize>,
    datasets_by_field: HashMap<String, Vec<usize>>,
}
impl FieldCatalog {
    pub fn builtin() -> CatalogResult<Self> {
        Self::from_yaml_str(BUILTIN_CATALOG)
    }
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> CatalogResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| CatalogError::ConfigFileError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }
    pub fn from_yaml_str(yaml_content: &str) -> CatalogResult<Self> {
        let document: CatalogDocument = serde_yaml::from_str(yaml_content)?;
        Self::from_datasets(document.datasets)
    }
    pub fn from_datasets(datasets: Vec<Dataset>) -> CatalogResult<Self> {
        if datasets.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        let mut dataset_by_id = HashMap::new();
        let mut datasets_by_field: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, dataset) in datasets.iter().enumerate() {
            if dataset_by_id.insert(dataset.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateDataset {
                    id: dataset.id.clone(),
                });
            }
            dataset.check_unique_ids()?;
            let field_ids = dataset
                .metrics
                .iter()
                .map(|m| &m.id)
                .chain(dataset.dimensions.iter().map(|d| &d.id));
            for id in field_ids {
                let owners = datasets_by_field.entry(id.clone()).or_default();
                if owners.last() != Some(&idx) {
                    owners.push(idx);
                }
            }
        }
        for dataset in &datasets {
            let related = dataset
                .relationships
                .related_datasets
                .iter()
                .chain(dataset.relationships.join_keys.keys());
            for related_id in related {
                if !dataset_by_id.contains_key(related_id) {
                    return Err(CatalogError::UnknownRelatedDataset {
                        dataset: dataset.id.clone(),
                        related: related_id.clone(),
                    });
                }
            }
        }
        debug!(datasets = datasets.len(), "Field catalog loaded");
        Ok(Self {
            datasets,
            dataset_by_id,
            datasets_by_field,
        })
    }
    pub fn list_datasets(&self) -> &[Dataset] {
        &self.datasets
    }
    pub fn len(&self) -> usize {
        self.datasets.len()
    }
    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
    pub fn get_dataset(&self, id: &str) -> CatalogResult<&Dataset> {
        self.dataset_by_id
            .get(id)
            .map(|&idx| &self.datasets[idx])
            .ok_or_else(|| CatalogError::DatasetNotFound { id: id.to_string() })
    }
    pub fn find_metric(&self, dataset_id: &str, metric_id: &str) -> CatalogResult<&Metric> {
        self.get_dataset(dataset_id)?.find_metric(metric_id)
    }
    pub fn find_dimension(
        &self,
        dataset_id: &str,
        dimension_id: &str,
    ) -> CatalogResult<&Dimension> {
        self.get_dataset(dataset_id)?.find_dimension(dimension_id)
    }
    pub fn find_filter(&self, dataset_id: &str, filter_id: &str) -> CatalogResult<&Filter> {
        self.get_dataset(dataset_id)?.find_filter(filter_id)
    }
    /// Ids of every dataset defining a metric or dimension with this id, in catalog order.
    pub fn datasets_containing_field(&self, field_id: &str) -> Vec<&str> {
        self.datasets_by_field
            .get(field_id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&idx| self.datasets[idx].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
    pub fn related_datasets(&self, dataset_id: &str) -> CatalogResult<Vec<&Dataset>> {
        let dataset = self.get_dataset(dataset_id)?;
        dataset
            .related_dataset_ids()
            .iter()
            .map(|id| self.get_dataset(id))
            .collect()
    }
    /// Re-resolves every assigned field and active filter of `config`.
    ///
    /// Configurations keep snapshots of the fields they reference, so a
    /// configuration built against one catalog can go stale against another.
    pub fn validate_configuration(&self, config: &ChartConfiguration) -> CatalogResult<()> {
        let dataset = self.get_dataset(config.dataset_id())?;
        for field in config.assigned_metrics() {
            dataset.find_metric(&field.field_id)?;
        }
        for field in config.assigned_dimensions() {
            dataset.find_dimension(&field.field_id)?;
        }
        for filter in config.active_filters() {
            dataset.find_filter(&filter.filter_id)?;
        }
        Ok(())
    }
}
