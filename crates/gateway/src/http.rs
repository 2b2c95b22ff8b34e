//! HTTP surface: MCP streamable HTTP endpoint, `/health` and `/map`.

use crate::server::{GatewayServer, ServerMetadata};
use apigate_openapi::runtime::ToolRecord;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// `/map` response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMap {
    pub server: ServerMetadata,
    /// Exposed tool name -> tool summary.
    pub tools: BTreeMap<String, ToolRecord>,
    pub routes: Vec<RouteEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    /// Exposed tool name, if the route became a tool.
    pub tool: Option<String>,
}

impl ToolMap {
    #[must_use]
    pub fn from_server(server: &GatewayServer) -> Self {
        let records = server.source().tool_records();
        let by_route: HashMap<(String, &str), &str> = records
            .iter()
            .map(|r| ((r.method.to_ascii_lowercase(), r.path.as_str()), r.name.as_str()))
            .collect();

        let routes = server
            .routes()
            .iter()
            .map(|route| RouteEntry {
                method: route.method.to_ascii_uppercase(),
                path: route.path.clone(),
                operation_id: route.operation_id.clone(),
                tool: by_route
                    .get(&(route.method.clone(), route.path.as_str()))
                    .map(|n| (*n).to_string()),
            })
            .collect();

        let tools = records
            .iter()
            .map(|r| (r.name.clone(), r.clone()))
            .collect();

        Self {
            server: server.metadata().clone(),
            tools,
            routes,
        }
    }
}

/// Build the gateway router with the MCP endpoint mounted at `mcp_path`.
pub fn router(server: GatewayServer, mcp_path: &str) -> Router {
    let mcp_service = StreamableHttpService::new(
        {
            let server = server.clone();
            move || Ok::<_, std::io::Error>(server.clone())
        },
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .route("/health", get(health))
        .route("/map", get(tool_map))
        .nest_service(mcp_path, mcp_service)
        .with_state(server)
}

async fn health() -> &'static str {
    "OK"
}

async fn tool_map(State(server): State<GatewayServer>) -> impl IntoResponse {
    Json(ToolMap::from_server(&server))
}
