//! MCP server handler backed by the generated tool source.

use apigate_openapi::error::OpenApiToolsError;
use apigate_openapi::routes::HttpRoute;
use apigate_openapi::runtime::OpenApiToolSource;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData, RoleServer, ServerHandler};
use serde::Serialize;
use std::sync::Arc;

/// Facts about the built server, shown on `/map` and in logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    pub base_url: String,
    pub spec_location: String,
    pub spec_sha256: String,
    pub api_title: String,
    pub api_version: String,
}

#[derive(Clone)]
pub struct GatewayServer {
    metadata: Arc<ServerMetadata>,
    source: OpenApiToolSource,
    routes: Arc<Vec<HttpRoute>>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(metadata: ServerMetadata, source: OpenApiToolSource, routes: Vec<HttpRoute>) -> Self {
        Self {
            metadata: Arc::new(metadata),
            source,
            routes: Arc::new(routes),
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &ServerMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn source(&self) -> &OpenApiToolSource {
        &self.source
    }

    /// Every route in the document, exposed or not.
    #[must_use]
    pub fn routes(&self) -> &[HttpRoute] {
        &self.routes
    }

    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.source.list_tools()
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<Tool> {
        self.source.get_tool(name)
    }

    /// Exposed tool names, in generation order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        self.source
            .tool_records()
            .into_iter()
            .map(|r| r.name)
            .collect()
    }
}

impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        let mut server_info = Implementation::from_build_env();
        server_info.name.clone_from(&self.metadata.name);
        server_info.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info,
            instructions: self.metadata.instructions.clone(),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.source.list_tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        match self.source.call_tool(&request.name, &arguments).await {
            Ok(result) => Ok(result),
            Err(OpenApiToolsError::UnknownTool(name)) => Err(ErrorData::invalid_params(
                format!("Unknown tool: {name}"),
                None,
            )),
            Err(e) => {
                tracing::warn!(tool = %request.name, error = %e, "Tool call failed");
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}
