//! Error types for the gateway.

use apigate_http::error::HttpToolsError;
use apigate_openapi::error::OpenApiToolsError;
use thiserror::Error;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (invalid YAML, missing fields, bad values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Startup errors (build timed out, listener failed)
    #[error("Startup error: {0}")]
    Startup(String),

    /// Spec loading, tool generation and tool call failures
    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),

    /// Upstream client construction failures
    #[error(transparent)]
    Http(#[from] HttpToolsError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
