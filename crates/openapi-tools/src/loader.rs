//! Loading the `OpenAPI` document and choosing the upstream base URL.

use crate::error::{OpenApiToolsError, Result};
use apigate_http::safety::{redact_url, sanitize_reqwest_error};
use openapiv3::{OpenAPI, Server};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// Base URL used when the document declares no servers and none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Where an `OpenAPI` document (or a document it references) lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SpecLocation {
    Url(Url),
    File(PathBuf),
}

impl SpecLocation {
    /// Parse a location string: `http(s)://` is a URL, `file://` and anything else a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the location looks like a URL but does not parse.
    pub fn parse(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec URL '{location}': {e}"))
            })?;
            Ok(Self::from_url(url))
        } else if location.starts_with("file://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid OpenAPI spec file URL '{location}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::OpenApi(format!("File URL has no local path: {location}"))
            })?;
            Ok(Self::from_path(path))
        } else {
            Ok(Self::from_path(PathBuf::from(location)))
        }
    }

    pub(crate) fn from_url(mut url: Url) -> Self {
        url.set_fragment(None);
        Self::Url(url)
    }

    pub(crate) fn from_path(path: PathBuf) -> Self {
        Self::File(std::fs::canonicalize(&path).unwrap_or(path))
    }

    #[must_use]
    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

impl fmt::Display for SpecLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(u) => f.write_str(&redact_url(u)),
            Self::File(p) => write!(f, "{}", p.display()),
        }
    }
}

/// What to do when the document hash differs from the pinned one.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    #[default]
    Warn,
    Fail,
    Ignore,
}

/// A parsed `OpenAPI` document together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedSpec {
    pub location: SpecLocation,
    pub spec: OpenAPI,
    /// `sha256:<hex>` of the raw document bytes.
    pub raw_sha256: String,
}

impl LoadedSpec {
    /// Compare the document hash against a pinned value.
    ///
    /// # Errors
    ///
    /// Returns an error on mismatch when `policy` is [`HashPolicy::Fail`].
    pub fn verify_hash(&self, expected: &str, policy: HashPolicy) -> Result<()> {
        if self.raw_sha256.eq_ignore_ascii_case(expected) {
            return Ok(());
        }
        match policy {
            HashPolicy::Fail => Err(OpenApiToolsError::OpenApi(format!(
                "Spec hash mismatch. Expected: {expected}, Got: {}",
                self.raw_sha256
            ))),
            HashPolicy::Warn => {
                tracing::warn!(
                    location = %self.location,
                    expected = %expected,
                    actual = %self.raw_sha256,
                    "OpenAPI spec hash mismatch"
                );
                Ok(())
            }
            HashPolicy::Ignore => Ok(()),
        }
    }
}

/// Fetch or read the document at `location` and parse it.
///
/// JSON is a subset of YAML, so one YAML parse covers both formats.
///
/// # Errors
///
/// Returns an error if the document cannot be fetched/read or is not a valid `OpenAPI` 3 document.
pub async fn load_spec(location: &SpecLocation, client: &Client) -> Result<LoadedSpec> {
    tracing::info!(location = %location, "Loading OpenAPI specification");

    let content = match location {
        SpecLocation::Url(url) => {
            let fetch_err = |message: String| OpenApiToolsError::OpenApiSpecFetch {
                url: redact_url(url),
                message,
            };
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| fetch_err(sanitize_reqwest_error(&e)))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(fetch_err(format!("server returned {status}")));
            }
            resp.text()
                .await
                .map_err(|e| fetch_err(sanitize_reqwest_error(&e)))?
        }
        SpecLocation::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
            OpenApiToolsError::OpenApiSpecReadFile {
                path: path.display().to_string(),
                source: e,
            }
        })?,
    };

    let raw_sha256 = format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())));
    let spec: OpenAPI =
        serde_yaml::from_str(&content).map_err(|e| OpenApiToolsError::OpenApiSpecParse {
            location: location.to_string(),
            source: e,
        })?;

    tracing::info!(
        title = %spec.info.title,
        version = %spec.info.version,
        paths = spec.paths.paths.len(),
        sha256 = %raw_sha256,
        "OpenAPI specification loaded"
    );

    Ok(LoadedSpec {
        location: location.clone(),
        spec,
        raw_sha256,
    })
}

/// Pick the upstream base URL.
///
/// An explicit override wins. Otherwise the first `servers` entry is used, with its variables
/// replaced by their defaults; a relative server URL is resolved against the document URL. With
/// no servers at all the gateway falls back to [`DEFAULT_BASE_URL`].
///
/// # Errors
///
/// Returns an error if the chosen URL is relative and the document was not loaded from a URL, or
/// if it cannot be joined onto the document URL.
pub fn determine_base_url(
    spec: &OpenAPI,
    location: &SpecLocation,
    override_url: Option<&str>,
) -> Result<String> {
    if let Some(url) = override_url.map(str::trim).filter(|u| !u.is_empty()) {
        tracing::info!(base_url = %url, "Using configured base URL");
        return absolutize(url, location);
    }

    let Some(server) = spec.servers.first() else {
        tracing::warn!(
            base_url = DEFAULT_BASE_URL,
            "No servers section found in OpenAPI spec, using default base URL"
        );
        return Ok(DEFAULT_BASE_URL.to_string());
    };

    let url = absolutize(&expand_server_variables(server), location)?;
    tracing::info!(base_url = %url, "Using base URL from OpenAPI servers");
    Ok(url)
}

fn expand_server_variables(server: &Server) -> String {
    let mut url = server.url.clone();
    if let Some(vars) = &server.variables {
        for (name, var) in vars {
            url = url.replace(&format!("{{{name}}}"), &var.default);
        }
    }
    url
}

fn absolutize(url: &str, location: &SpecLocation) -> Result<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(url.to_string());
    }
    match location {
        SpecLocation::Url(spec_url) => {
            let joined = spec_url.join(url).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Invalid base URL '{url}': {e} (set baseUrl explicitly)"
                ))
            })?;
            Ok(joined.to_string())
        }
        SpecLocation::File(_) => Err(OpenApiToolsError::OpenApi(format!(
            "Invalid base URL '{url}': must be an absolute http(s) URL when the spec is a local file (set baseUrl explicitly)"
        ))),
    }
}
