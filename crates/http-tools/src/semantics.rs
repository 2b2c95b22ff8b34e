//! MCP tool annotations derived from HTTP method semantics (RFC 9110).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Annotations for a tool that issues `method` against the upstream API.
///
/// Every generated tool talks to an external system, so `openWorldHint` is always set. Unknown
/// extension methods get no other hints.
#[must_use]
pub fn annotations_for_method(method: &Method) -> ToolAnnotations {
    // (read_only, destructive, idempotent)
    let hints = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" | "TRACE" => Some((true, false, Some(true))),
        "POST" => Some((false, false, Some(false))),
        "PUT" | "DELETE" => Some((false, true, Some(true))),
        // PATCH may or may not be idempotent.
        "PATCH" => Some((false, true, None)),
        _ => None,
    };

    let (read_only_hint, destructive_hint, idempotent_hint) = match hints {
        Some((read_only, destructive, idempotent)) => {
            (Some(read_only), Some(destructive), idempotent)
        }
        None => (None, None, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint,
        destructive_hint,
        idempotent_hint,
        open_world_hint: Some(true),
    }
}
