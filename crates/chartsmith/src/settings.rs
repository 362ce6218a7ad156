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

use crate::config::DisclosureLevel;
use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_SIMULATED_LATENCY_MS: u64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewSettings {
    /// Delay applied before each asynchronous refresh.
    pub simulated_latency_ms: u64,
    /// Point cap applied once the advanced section is active.
    pub max_preview_points: Option<usize>,
}
impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 800,
            max_preview_points: Some(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub preview: PreviewSettings,
    pub default_disclosure_level: DisclosureLevel,
    /// Catalog YAML to load instead of the built-in catalog.
    pub catalog_path: Option<PathBuf>,
}
impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            preview: PreviewSettings::default(),
            default_disclosure_level: DisclosureLevel::default(),
            catalog_path: None,
        }
    }
}
impl EngineSettings {
    pub fn for_testing() -> Self {
        Self {
            preview: PreviewSettings {
                simulated_latency_ms: 0,
                max_preview_points: None,
            },
            ..Self::default()
        }
    }
    pub fn for_interactive() -> Self {
        Self {
            preview: PreviewSettings {
                simulated_latency_ms: 300,
                max_preview_points: Some(25),
            },
            default_disclosure_level: DisclosureLevel::clamped(2),
            catalog_path: None,
        }
    }
    pub fn validate(&self) -> SettingsResult<()> {
        if self.preview.simulated_latency_ms > MAX_SIMULATED_LATENCY_MS {
            return Err(SettingsError::OutOfRange {
                field: "preview.simulatedLatencyMs".to_string(),
                value: self.preview.simulated_latency_ms.to_string(),
            });
        }
        if self.preview.max_preview_points == Some(0) {
            return Err(SettingsError::OutOfRange {
                field: "preview.maxPreviewPoints".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SettingsResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| SettingsError::ConfigFileError {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_yaml_str(&content)
    }
    pub fn from_yaml_str(yaml_content: &str) -> SettingsResult<Self> {
        let settings: Self = serde_yaml::from_str(yaml_content)?;
        settings.validate()?;
        Ok(settings)
    }
}
