//! `OpenAPI` -> MCP tool generation.
//!
//! The pipeline, in the order the gateway runs it:
//! - [`loader`]: fetch/read and parse the `OpenAPI` document, pick the upstream base URL
//! - [`routes`]: enumerate every operation in the document
//! - [`mappings`]: the operationId -> tool name table
//! - [`selection`]: decide which routes become tools
//! - [`runtime`]: generate tools and execute `tools/call` against the upstream API
//! - [`transform`]: rename and re-describe the generated tools
//!
//! `$ref`s are resolved by [`resolver`] (local, file and URL references).

pub mod error;
pub mod loader;
pub mod mappings;
mod query;
pub mod resolver;
pub mod routes;
pub mod runtime;
mod schema;
pub mod selection;
pub mod transform;
