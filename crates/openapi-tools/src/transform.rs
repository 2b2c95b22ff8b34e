//! Tool renaming: apply the mapping table to generated tools.
//!
//! Generation names a tool after its operationId (or method and path). The transformer first
//! observes which generated name each operationId received, then renames those tools and
//! replaces their descriptions as the mapping table says.

use crate::error::{OpenApiToolsError, Result};
use crate::mappings::ToolMappings;
use crate::runtime::MAX_TOOL_NAME_LEN;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

/// A tool the transformer can rename.
pub trait RenameTarget {
    fn current_name(&self) -> &str;
    fn rename(&mut self, name: Option<String>, description: Option<String>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renamed {
    pub operation_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub renamed: Vec<Renamed>,
    /// Tools whose description was replaced, by exposed name.
    pub described: Vec<String>,
    /// Mapped operationIds that matched no generated tool.
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ToolTransformer {
    mappings: ToolMappings,
    /// operationId -> generated tool name
    observed: BTreeMap<String, String>,
}

/// `true` if `name` is usable as an MCP tool name.
#[must_use]
pub fn is_valid_tool_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_TOOL_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl ToolTransformer {
    #[must_use]
    pub fn new(mappings: ToolMappings) -> Self {
        Self {
            mappings,
            observed: BTreeMap::new(),
        }
    }

    /// Record that the operation `operation_id` was generated as `generated_name`.
    ///
    /// The first tool observed for an operationId keeps it; later duplicates are ignored.
    pub fn observe(&mut self, operation_id: &str, generated_name: &str) {
        match self.observed.entry(operation_id.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(generated_name.to_string());
            }
            Entry::Occupied(first) => {
                tracing::warn!(
                    operation_id = %operation_id,
                    kept = %first.get(),
                    ignored = %generated_name,
                    "Duplicate operationId; mappings apply to the first tool only"
                );
            }
        }
    }

    /// Rename and re-describe `tools`.
    ///
    /// Mapping entries whose custom name is not a valid tool name keep the generated name (their
    /// description still applies).
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] if two tools would end up with the same name. `tools`
    /// is left untouched in that case.
    pub fn apply<T: RenameTarget>(&self, tools: &mut [T]) -> Result<TransformReport> {
        tracing::info!(mappings = self.mappings.len(), "Transforming tools");

        let by_name: HashMap<&str, usize> = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.current_name(), i))
            .collect();

        let mut report = TransformReport::default();
        // index -> (new name, new description)
        let mut plan: BTreeMap<usize, (Option<String>, Option<String>)> = BTreeMap::new();

        for (op_id, mapping) in self.mappings.iter() {
            let Some(idx) = self
                .observed
                .get(op_id)
                .and_then(|generated| by_name.get(generated.as_str()).copied())
            else {
                report.unmatched.push(op_id.to_string());
                continue;
            };
            let current = tools[idx].current_name();

            let new_name = match mapping.name.as_deref() {
                Some(name) if name == current => None,
                Some(name) if !is_valid_tool_name(name) => {
                    tracing::warn!(
                        operation_id = %op_id,
                        name = %name,
                        "Invalid custom tool name (expected [A-Za-z0-9_-], at most 64 chars), keeping generated name"
                    );
                    None
                }
                Some(name) => Some(name.to_string()),
                None => None,
            };

            if let Some(to) = &new_name {
                report.renamed.push(Renamed {
                    operation_id: op_id.to_string(),
                    from: current.to_string(),
                    to: to.clone(),
                });
            }
            if mapping.description.is_some() {
                report
                    .described
                    .push(new_name.clone().unwrap_or_else(|| current.to_string()));
            }
            if new_name.is_some() || mapping.description.is_some() {
                plan.insert(idx, (new_name, mapping.description.clone()));
            }
        }

        let mut final_names: HashMap<String, usize> = HashMap::new();
        for (i, tool) in tools.iter().enumerate() {
            let name = plan
                .get(&i)
                .and_then(|(n, _)| n.clone())
                .unwrap_or_else(|| tool.current_name().to_string());
            if let Some(other) = final_names.insert(name.clone(), i) {
                return Err(OpenApiToolsError::Config(format!(
                    "Tool name '{name}' would be used by both '{}' and '{}' after renaming",
                    tools[other].current_name(),
                    tool.current_name()
                )));
            }
        }

        for (idx, (name, description)) in plan {
            tools[idx].rename(name, description);
        }

        for r in &report.renamed {
            tracing::info!(operation_id = %r.operation_id, from = %r.from, to = %r.to, "Renamed tool");
        }
        for op_id in &report.unmatched {
            tracing::warn!(operation_id = %op_id, "Tool mapping matched no generated tool");
        }

        Ok(report)
    }
}
