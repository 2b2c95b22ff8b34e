//! Authenticated HTTP client for the upstream API.

use crate::config::{ClientConfig, ResolvedAuth};
use crate::error::{HttpToolsError, Result};
use crate::safety::redact_url;
use base64::Engine as _;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder};
use url::Url;

/// HTTP client bound to one upstream base URL.
///
/// Every request carries the configured default headers and authentication. The client can be
/// closed once; later requests fail with a runtime error instead of reaching the network.
#[derive(Debug)]
pub struct ApiClient {
    base_url: Url,
    client: RwLock<Option<Client>>,
    query_auth: Option<(String, String)>,
}

impl ApiClient {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute `http(s)` URL, if a configured header
    /// is invalid, or if the underlying `reqwest` client cannot be built.
    pub fn new(base_url: &str, settings: &ClientConfig, auth: ResolvedAuth) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HttpToolsError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(HttpToolsError::Config(format!(
                "base URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        let headers = default_headers(settings, &auth)?;
        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = settings.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HttpToolsError::Config(format!("failed to build HTTP client: {e}")))?;

        let query_auth = match auth {
            ResolvedAuth::Query { name, value } => Some((name, value)),
            _ => None,
        };

        tracing::info!(base_url = %redact_url(&base_url), "API client ready");
        Ok(Self {
            base_url,
            client: RwLock::new(Some(client)),
            query_auth,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Query-string credential appended to every request, if any.
    #[must_use]
    pub fn query_auth(&self) -> Option<(&str, &str)> {
        self.query_auth
            .as_ref()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Join an API path (`/items/42`) onto the base URL, keeping any base path prefix and base
    /// query string.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_fragment(None);
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    /// Start a request with default headers and authentication applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the client has been closed.
    pub fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let guard = self.client.read();
        let Some(client) = guard.as_ref() else {
            return Err(HttpToolsError::Runtime("API client is closed".to_string()));
        };
        let mut req = client.request(method, url);
        if let Some((name, value)) = &self.query_auth {
            req = req.query(&[(name, value)]);
        }
        Ok(req)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.read().is_none()
    }

    /// Release the connection pool. Safe to call more than once.
    pub fn close(&self) {
        if self.client.write().take().is_some() {
            tracing::info!(base_url = %redact_url(&self.base_url), "API client closed");
        }
    }
}

/// Headers sent with every upstream request.
///
/// # Errors
///
/// Returns an error if a configured header name or value is not valid HTTP.
pub fn default_headers(settings: &ClientConfig, auth: &ResolvedAuth) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, header_value(&settings.user_agent())?);
    headers.insert(ACCEPT, header_value(&settings.accept)?);

    for (name, value) in &settings.headers {
        headers.insert(header_name(name)?, header_value(value)?);
    }

    match auth {
        ResolvedAuth::None | ResolvedAuth::Query { .. } => {}
        ResolvedAuth::Bearer(token) => {
            headers.insert(AUTHORIZATION, sensitive(&format!("Bearer {token}"))?);
        }
        ResolvedAuth::Header { name, value } => {
            headers.insert(header_name(name)?, sensitive(value)?);
        }
        ResolvedAuth::Basic { username, password } => {
            let b64 =
                base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
            headers.insert(AUTHORIZATION, sensitive(&format!("Basic {b64}"))?);
        }
    }
    Ok(headers)
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| HttpToolsError::Config(format!("invalid header name '{name}'")))
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| HttpToolsError::Config(format!("invalid header value '{value}'")))
}

fn sensitive(value: &str) -> Result<HeaderValue> {
    let mut v = HeaderValue::from_str(value)
        .map_err(|_| HttpToolsError::Config("invalid credential header value".to_string()))?;
    v.set_sensitive(true);
    Ok(v)
}
