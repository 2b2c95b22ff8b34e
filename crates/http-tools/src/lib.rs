//! Outbound HTTP plumbing shared by the apigate crates.
//!
//! This crate owns everything that talks to the *upstream* API:
//! - authentication configuration and secret resolution ([`config`])
//! - the authenticated API client factory ([`client`])
//! - error/URL redaction for logs ([`safety`])
//! - MCP tool annotations derived from HTTP method semantics ([`semantics`])
//!
//! It intentionally knows nothing about `OpenAPI` documents or MCP sessions.

pub mod client;
pub mod config;
pub mod error;
pub mod safety;
pub mod semantics;
