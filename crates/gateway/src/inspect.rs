//! Component inspection: what a built server exposes.

use crate::server::GatewayServer;
use std::fmt;

/// Sorted component names. The gateway only generates tools; the other lists are always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSummary {
    pub tools: Vec<String>,
    pub resources: Vec<String>,
    pub resource_templates: Vec<String>,
}

#[must_use]
pub fn inspect_components(server: &GatewayServer) -> ComponentSummary {
    let mut tools = server.tool_names();
    tools.sort();
    let summary = ComponentSummary {
        tools,
        resources: Vec::new(),
        resource_templates: Vec::new(),
    };
    tracing::info!(
        tools = summary.tools.len(),
        resources = summary.resources.len(),
        resource_templates = summary.resource_templates.len(),
        names = %summary.tools.join(", "),
        "Inspected MCP components"
    );
    summary
}

impl fmt::Display for ComponentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("Tool", "tools", &self.tools),
            ("Resource", "resources", &self.resources),
            ("Resource Template", "resource templates", &self.resource_templates),
        ];
        for (label, plural, names) in sections {
            writeln!(f, "{} {label}(s) found:", names.len())?;
            if names.is_empty() {
                writeln!(f, "  No {plural} generated.")?;
            } else {
                writeln!(f, "  Names: {}", names.join(", "))?;
            }
        }
        Ok(())
    }
}
