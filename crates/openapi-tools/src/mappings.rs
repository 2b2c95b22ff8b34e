//! The operationId -> tool name mapping table.
//!
//! File format (JSON object keyed by operationId):
//!
//! ```json
//! {
//!   "listServices": "search_services",
//!   "getStructure": { "name": "get_structure", "description": "Fetch one structure by id" }
//! }
//! ```
//!
//! A missing or malformed file never fails the gateway: it starts with an empty table.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Custom naming for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolMapping {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMapping {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<RawMapping> for ToolMapping {
    fn from(raw: RawMapping) -> Self {
        match raw {
            RawMapping::Name(name) => Self {
                name: Some(name),
                description: None,
            },
            RawMapping::Detailed { name, description } => Self { name, description },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolMappings {
    entries: BTreeMap<String, ToolMapping>,
}

impl ToolMappings {
    /// Load the table from `path`.
    ///
    /// No path, a missing file, or invalid JSON all yield an empty table (logged at info, warn
    /// and error level respectively).
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::info!("No custom tool mappings file specified. Using empty mappings.");
            return Self::default();
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "Custom tool mappings file not found. Using empty mappings."
                );
                return Self::default();
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Failed to read custom tool mappings file. Using empty mappings."
                );
                return Self::default();
            }
        };

        match Self::from_json_str(&text) {
            Ok(mappings) => {
                tracing::info!(
                    path = %path.display(),
                    entries = mappings.len(),
                    "Loaded custom tool mappings"
                );
                mappings
            }
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Error decoding JSON from tool mappings file. Using empty mappings."
                );
                Self::default()
            }
        }
    }

    /// Parse a mapping table from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not an object of strings / `{name, description}` objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawMapping> = serde_json::from_str(json)?;
        Ok(Self {
            entries: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        })
    }

    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&ToolMapping> {
        self.entries.get(operation_id)
    }

    #[must_use]
    pub fn contains(&self, operation_id: &str) -> bool {
        self.entries.contains_key(operation_id)
    }

    /// Mapped operationIds, sorted.
    pub fn operation_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolMapping)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(String, ToolMapping)> for ToolMappings {
    fn from_iter<I: IntoIterator<Item = (String, ToolMapping)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
