//! apigate: expose an `OpenAPI`-described HTTP API as MCP tools.
//!
//! [`factory::GatewayFactory`] turns a [`config::ServiceConfig`] into a
//! [`server::GatewayServer`], which is served over streamable HTTP ([`http`]) or stdio.

pub mod config;
pub mod error;
pub mod factory;
pub mod http;
pub mod inspect;
pub mod server;
