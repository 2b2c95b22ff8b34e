//! Route enumeration: every (method, path) operation declared by the document.

use crate::loader::SpecLocation;
use crate::resolver::OpenApiResolver;
use openapiv3::{OpenAPI, Operation, Parameter, PathItem, ReferenceOr};
use serde::Serialize;

/// HTTP methods an `OpenAPI` path item can declare, in the order routes are reported.
pub const METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// One operation of the upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    /// Lowercase HTTP method.
    pub method: String,
    /// Path template, e.g. `/pets/{petId}`.
    pub path: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl HttpRoute {
    /// `GET /pets/{petId}` form, for logs and errors.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }
}

/// A route together with everything tool generation needs from the document.
#[derive(Debug, Clone)]
pub struct RouteOperation {
    pub route: HttpRoute,
    /// Document the (possibly referenced) path item came from.
    pub(crate) doc: SpecLocation,
    pub(crate) path_params: Vec<ReferenceOr<Parameter>>,
    pub(crate) operation: Operation,
}

/// Enumerate every operation in document order.
///
/// Path items that are `$ref`s are resolved first; a path item that cannot be resolved is skipped
/// with a warning.
pub async fn enumerate_operations(
    spec: &OpenAPI,
    resolver: &OpenApiResolver<'_>,
) -> Vec<RouteOperation> {
    let mut out = Vec::new();

    for (path, item) in &spec.paths.paths {
        let (doc, item) = match resolver.resolve::<PathItem>(resolver.root(), item).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Skipping unresolvable path item");
                continue;
            }
        };

        for method in METHODS {
            let Some(op) = operation_for(&item, method) else {
                continue;
            };
            out.push(RouteOperation {
                route: HttpRoute {
                    method: method.to_string(),
                    path: path.clone(),
                    operation_id: op.operation_id.clone(),
                    summary: op.summary.clone(),
                    description: op.description.clone(),
                    tags: op.tags.clone(),
                },
                doc: doc.clone(),
                path_params: item.parameters.clone(),
                operation: op.clone(),
            });
        }
    }

    tracing::debug!(routes = out.len(), "Enumerated OpenAPI routes");
    out
}

/// Enumerate routes without the generation payload.
pub async fn enumerate_routes(spec: &OpenAPI, resolver: &OpenApiResolver<'_>) -> Vec<HttpRoute> {
    enumerate_operations(spec, resolver)
        .await
        .into_iter()
        .map(|op| op.route)
        .collect()
}

fn operation_for<'a>(item: &'a PathItem, method: &str) -> Option<&'a Operation> {
    match method {
        "get" => item.get.as_ref(),
        "put" => item.put.as_ref(),
        "post" => item.post.as_ref(),
        "delete" => item.delete.as_ref(),
        "options" => item.options.as_ref(),
        "head" => item.head.as_ref(),
        "patch" => item.patch.as_ref(),
        "trace" => item.trace.as_ref(),
        _ => None,
    }
}
