//! Service configuration file.
//!
//! The file is YAML (camelCase keys). `${VAR}` and `${VAR:-default}` are replaced from the
//! environment before parsing; relative paths are resolved against the file's directory.

use crate::error::{GatewayError, Result};
use apigate_http::config::{AuthConfig, ClientConfig};
use apigate_openapi::loader::HashPolicy;
use apigate_openapi::mappings::ToolMappings;
use apigate_openapi::selection::RouteRuleConfig;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_NAME: &str = "apigate";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";
pub const DEFAULT_MCP_PATH: &str = "/mcp";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    /// MCP server name reported to clients.
    #[serde(default = "default_name")]
    pub name: String,

    /// `OpenAPI` document location (URL or file path).
    #[serde(default)]
    pub openapi: String,

    /// Override for the document's `servers[0].url`.
    #[serde(default)]
    pub base_url: Option<String>,

    /// JSON file mapping operationId -> tool name (or `{name, description}`).
    #[serde(default)]
    pub tool_mappings_file: Option<PathBuf>,

    /// Expose only mapped operations. Defaults to `true` when the mapping table is non-empty.
    #[serde(default)]
    pub restrict_to_mappings: Option<bool>,

    /// Route rules evaluated before the mapping restriction.
    #[serde(default)]
    pub routes: Vec<RouteRuleConfig>,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    /// Instructions returned to MCP clients on initialize.
    #[serde(default)]
    pub instructions: Option<String>,

    /// Pinned `sha256:<hex>` of the `OpenAPI` document.
    #[serde(default)]
    pub spec_hash: Option<String>,

    #[serde(default)]
    pub spec_hash_policy: HashPolicy,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    #[default]
    StreamableHttp,
    Stdio,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Mount path of the MCP endpoint.
    #[serde(default = "default_mcp_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            bind: default_bind(),
            path: default_mcp_path(),
        }
    }
}

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_mcp_path() -> String {
    DEFAULT_MCP_PATH.to_string()
}

fn default_startup_timeout_secs() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_SECS
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            openapi: String::new(),
            base_url: None,
            tool_mappings_file: None,
            restrict_to_mappings: None,
            routes: Vec::new(),
            auth: AuthConfig::default(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            startup_timeout_secs: default_startup_timeout_secs(),
            instructions: None,
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
        }
    }
}

impl ServiceConfig {
    /// Read, interpolate and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, references an unset variable without a
    /// default, or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        let mut config = Self::from_yaml_str(&raw)?;
        if let Some(dir) = path.parent() {
            config.resolve_relative_paths(dir);
        }
        tracing::info!(path = %path.display(), name = %config.name, "Loaded service configuration");
        Ok(config)
    }

    /// Parse configuration text, interpolating environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error on unset variables or invalid YAML.
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Self::from_yaml_str_with(raw, |key| std::env::var(key).ok())
    }

    /// Like [`Self::from_yaml_str`], resolving variables with `lookup`.
    ///
    /// Interpolation runs on parsed string values, so substituted text is never read as YAML and
    /// placeholders in comments are ignored. A value that is exactly one placeholder and expands
    /// to a number or boolean keeps that type.
    ///
    /// # Errors
    ///
    /// Returns an error on unset variables or invalid YAML.
    pub fn from_yaml_str_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut doc: serde_yaml::Value = serde_yaml::from_str(raw)?;
        interpolate_value(&mut doc, &lookup)?;
        Ok(serde_yaml::from_value(doc)?)
    }

    fn resolve_relative_paths(&mut self, dir: &Path) {
        if let Some(file) = &self.tool_mappings_file
            && file.is_relative()
        {
            self.tool_mappings_file = Some(dir.join(file));
        }
        let is_url = self.openapi.contains("://");
        if !is_url && !self.openapi.is_empty() && Path::new(&self.openapi).is_relative() {
            self.openapi = dir.join(&self.openapi).display().to_string();
        }
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(GatewayError::Config("name must not be empty".to_string()));
        }
        if self.openapi.trim().is_empty() {
            return Err(GatewayError::Config(
                "openapi (spec path or URL) is required".to_string(),
            ));
        }
        if self.startup_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "startupTimeoutSecs must be greater than 0".to_string(),
            ));
        }
        if !self.server.path.starts_with('/') || self.server.path.len() < 2 {
            return Err(GatewayError::Config(format!(
                "server.path must start with '/' and not be the root, got '{}'",
                self.server.path
            )));
        }
        if matches!(self.server.path.as_str(), "/health" | "/map") {
            return Err(GatewayError::Config(format!(
                "server.path '{}' is reserved",
                self.server.path
            )));
        }
        if self.server.transport == Transport::StreamableHttp {
            self.bind_addr()?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if `server.bind` is not `host:port`.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            GatewayError::Config(format!("invalid server.bind '{}': {e}", self.server.bind))
        })
    }

    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Whether only mapped operations become tools.
    #[must_use]
    pub fn restricts_to_mappings(&self, mappings: &ToolMappings) -> bool {
        self.restrict_to_mappings.unwrap_or(!mappings.is_empty())
    }
}

/// Replace `${VAR}` / `${VAR:-default}` using `lookup`.
///
/// # Errors
///
/// Returns an error naming the first variable that is unset and has no default.
pub fn interpolate_env(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .map_err(|e| GatewayError::Config(format!("interpolation pattern: {e}")))?;

    let mut missing: Option<String> = None;
    let out = re.replace_all(raw, |caps: &Captures<'_>| {
        let name = &caps[1];
        match (lookup(name), caps.get(2)) {
            (Some(v), _) => v,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(GatewayError::Config(format!(
            "environment variable '{name}' is not set and has no default"
        ))),
        None => Ok(out.into_owned()),
    }
}

fn interpolate_value(
    value: &mut serde_yaml::Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<()> {
    use serde_yaml::Value;

    match value {
        Value::String(s) => {
            let whole = is_single_placeholder(s);
            let expanded = interpolate_env(s, lookup)?;
            let replacement = if whole {
                typed_scalar(expanded)
            } else {
                Value::String(expanded)
            };
            *value = replacement;
        }
        Value::Mapping(map) => {
            for v in map.values_mut() {
                interpolate_value(v, lookup)?;
            }
        }
        Value::Sequence(seq) => {
            for v in seq {
                interpolate_value(v, lookup)?;
            }
        }
        Value::Tagged(tagged) => interpolate_value(&mut tagged.value, lookup)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

fn is_single_placeholder(s: &str) -> bool {
    s.starts_with("${") && s.ends_with('}') && s.matches("${").count() == 1
}

fn typed_scalar(expanded: String) -> serde_yaml::Value {
    match serde_yaml::from_str::<serde_yaml::Value>(&expanded) {
        Ok(v @ (serde_yaml::Value::Number(_) | serde_yaml::Value::Bool(_))) => v,
        _ => serde_yaml::Value::String(expanded),
    }
}
