//! Error types for `apigate-openapi`.

use thiserror::Error;

/// Main error type for `OpenAPI` tooling.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Invalid configuration (bad rule pattern, tool name collision after renaming).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (build timeout, no tools to expose).
    #[error("Startup error: {0}")]
    Startup(String),

    /// Tool call failed before reaching the upstream API (missing argument, bad URL).
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Upstream API call failed (transport error or non-2xx response).
    #[error("HTTP error: {0}")]
    Http(String),

    /// `OpenAPI` document errors (bad `$ref`, unusable server URL).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    OpenApiSpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    OpenApiSpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {source}")]
    OpenApiSpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two arguments of one operation map to the same tool argument name.
    #[error("Parameter collision: {0}")]
    ParamCollision(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl From<apigate_http::error::HttpToolsError> for OpenApiToolsError {
    fn from(value: apigate_http::error::HttpToolsError) -> Self {
        use apigate_http::error::HttpToolsError;
        match value {
            HttpToolsError::Config(m) => Self::Config(m),
            HttpToolsError::Runtime(m) => Self::Runtime(m),
            HttpToolsError::Transport(m) => Self::Http(m),
        }
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
