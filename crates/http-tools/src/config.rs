use crate::error::{HttpToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Default per-request timeout for upstream API calls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default `Accept` header sent to the upstream API.
pub const DEFAULT_ACCEPT: &str = "application/json";

/// Authentication applied to every upstream request.
///
/// Secrets can be given literally or by naming an environment variable (`tokenEnv`,
/// `valueEnv`, `passwordEnv`). A literal always wins over the environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum AuthConfig {
    #[default]
    None,
    Bearer {
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        token_env: Option<String>,
    },
    Header {
        name: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        value_env: Option<String>,
    },
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        password_env: Option<String>,
    },
    Query {
        name: String,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        value_env: Option<String>,
    },
}

/// Authentication with every secret resolved.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedAuth {
    None,
    Bearer(String),
    Header { name: String, value: String },
    Basic { username: String, password: String },
    Query { name: String, value: String },
}

impl fmt::Debug for ResolvedAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer(token) => write!(f, "Bearer({})", mask_secret(token)),
            Self::Header { name, value } => write!(f, "Header({name}: {})", mask_secret(value)),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            Self::Query { name, value } => write!(f, "Query({name}={})", mask_secret(value)),
        }
    }
}

impl AuthConfig {
    /// Resolve secrets from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a header, basic or query scheme has no secret available.
    pub fn resolve(&self) -> Result<ResolvedAuth> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve secrets using `lookup` for environment variables.
    ///
    /// A bearer scheme without a token degrades to [`ResolvedAuth::None`]: public endpoints keep
    /// working and authenticated ones fail upstream.
    ///
    /// # Errors
    ///
    /// Returns an error if a header, basic or query scheme has no secret available.
    pub fn resolve_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<ResolvedAuth> {
        let secret = |literal: &Option<String>, env: &Option<String>| {
            literal
                .clone()
                .or_else(|| env.as_deref().and_then(&lookup))
                .filter(|s| !s.is_empty())
        };

        match self {
            AuthConfig::None => Ok(ResolvedAuth::None),
            AuthConfig::Bearer { token, token_env } => match secret(token, token_env) {
                Some(token) => {
                    tracing::info!(token = %mask_secret(&token), "using bearer authentication");
                    Ok(ResolvedAuth::Bearer(token))
                }
                None => {
                    tracing::warn!(
                        token_env = token_env.as_deref().unwrap_or("<none>"),
                        "bearer token not set; authenticated endpoints will fail"
                    );
                    Ok(ResolvedAuth::None)
                }
            },
            AuthConfig::Header {
                name,
                value,
                value_env,
            } => {
                let value = secret(value, value_env).ok_or_else(|| {
                    HttpToolsError::Config(format!("auth header '{name}' has no value"))
                })?;
                Ok(ResolvedAuth::Header {
                    name: name.clone(),
                    value,
                })
            }
            AuthConfig::Basic {
                username,
                password,
                password_env,
            } => {
                let password = secret(password, password_env).ok_or_else(|| {
                    HttpToolsError::Config(format!("basic auth for '{username}' has no password"))
                })?;
                Ok(ResolvedAuth::Basic {
                    username: username.clone(),
                    password,
                })
            }
            AuthConfig::Query {
                name,
                value,
                value_env,
            } => {
                let value = secret(value, value_env).ok_or_else(|| {
                    HttpToolsError::Config(format!("auth query parameter '{name}' has no value"))
                })?;
                Ok(ResolvedAuth::Query {
                    name: name.clone(),
                    value,
                })
            }
        }
    }
}

/// Settings for the upstream API client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Per-request timeout in seconds (`0` disables the timeout).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `User-Agent` header. Defaults to `apigate/<version>`.
    #[serde(default)]
    pub user_agent: Option<String>,

    /// `Accept` header.
    #[serde(default = "default_accept")]
    pub accept: String,

    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
            accept: DEFAULT_ACCEPT.to_string(),
            headers: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("apigate/{}", env!("CARGO_PKG_VERSION")))
    }
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_accept() -> String {
    DEFAULT_ACCEPT.to_string()
}

/// Mask a secret for logging, keeping only its last four characters.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 4 {
        return "***".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| {
            owned
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn bearer_token_is_read_from_env() {
        let cfg: AuthConfig =
            auth_from_json(r#"{"type":"bearer","tokenEnv":"API_KEY"}"#);
        let resolved = cfg
            .resolve_with(env_of(&[("API_KEY", "secret-1234")]))
            .unwrap();
        assert_eq!(resolved, ResolvedAuth::Bearer("secret-1234".to_string()));
    }

    #[test]
    fn literal_token_wins_over_env() {
        let cfg = AuthConfig::Bearer {
            token: Some("literal".to_string()),
            token_env: Some("API_KEY".to_string()),
        };
        let resolved = cfg.resolve_with(env_of(&[("API_KEY", "env")])).unwrap();
        assert_eq!(resolved, ResolvedAuth::Bearer("literal".to_string()));
    }

    #[test]
    fn missing_bearer_token_degrades_to_no_auth() {
        let cfg = AuthConfig::Bearer {
            token: None,
            token_env: Some("API_KEY".to_string()),
        };
        assert_eq!(cfg.resolve_with(env_of(&[])).unwrap(), ResolvedAuth::None);
    }

    #[test]
    fn missing_header_secret_is_an_error() {
        let cfg = AuthConfig::Header {
            name: "X-Api-Key".to_string(),
            value: None,
            value_env: Some("MISSING".to_string()),
        };
        let err = cfg.resolve_with(env_of(&[])).unwrap_err();
        assert!(err.to_string().contains("X-Api-Key"));
    }

    #[test]
    fn debug_output_masks_secrets() {
        let auth = ResolvedAuth::Bearer("abcdefgh1234".to_string());
        let dbg = format!("{auth:?}");
        assert!(!dbg.contains("abcdefgh"));
        assert!(dbg.contains("***1234"));
    }

    #[test]
    fn mask_secret_hides_short_values() {
        assert_eq!(mask_secret("abc"), "***");
        assert_eq!(mask_secret("abcdef"), "***cdef");
    }

    #[test]
    fn client_config_defaults() {
        let cfg: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.accept, "application/json");
        assert!(cfg.user_agent().starts_with("apigate/"));

        let cfg: ClientConfig = serde_json::from_str(r#"{"timeoutSecs":0}"#).unwrap();
        assert_eq!(cfg.timeout(), None);
    }

    fn auth_from_json(json: &str) -> AuthConfig {
        serde_json::from_str(json).unwrap()
    }
}
