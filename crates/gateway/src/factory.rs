//! Build orchestration: configuration in, ready MCP server out.

use crate::config::ServiceConfig;
use crate::error::{GatewayError, Result};
use crate::server::{GatewayServer, ServerMetadata};
use apigate_http::client::ApiClient;
use apigate_openapi::error::OpenApiToolsError;
use apigate_openapi::loader::{LoadedSpec, SpecLocation, determine_base_url, load_spec};
use apigate_openapi::mappings::ToolMappings;
use apigate_openapi::resolver::OpenApiResolver;
use apigate_openapi::routes::{HttpRoute, enumerate_operations};
use apigate_openapi::runtime::OpenApiToolSource;
use apigate_openapi::selection::RouteMap;
use apigate_openapi::transform::ToolTransformer;
use parking_lot::Mutex;
use std::sync::Arc;

/// Builds a [`GatewayServer`] from a [`ServiceConfig`] and owns the upstream client's lifetime.
pub struct GatewayFactory {
    config: ServiceConfig,
    client: Mutex<Option<Arc<ApiClient>>>,
}

impl GatewayFactory {
    #[must_use]
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            client: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The upstream client, once the build has created it. It stays here after [`Self::cleanup`],
    /// closed.
    #[must_use]
    pub fn client(&self) -> Option<Arc<ApiClient>> {
        self.client.lock().clone()
    }

    /// Run every build step, bounded by the startup timeout.
    ///
    /// On failure the upstream client (if already created) is closed before returning.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error, or [`GatewayError::Startup`] on timeout.
    pub async fn build(&self) -> Result<GatewayServer> {
        let timeout = self.config.startup_timeout();
        let result = match tokio::time::timeout(timeout, self.build_steps()).await {
            Ok(r) => r,
            Err(_) => Err(GatewayError::Startup(format!(
                "building the MCP server timed out after {}s",
                timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            tracing::error!(error = %e, "Failed to build MCP server");
            self.cleanup();
        }
        result
    }

    async fn build_steps(&self) -> Result<GatewayServer> {
        let config = &self.config;

        // 1. Tool mappings
        let mappings = ToolMappings::load(config.tool_mappings_file.as_deref());

        // 2. OpenAPI document
        let spec_http = spec_http_client(config)?;
        let location = SpecLocation::parse(&config.openapi)?;
        let loaded = load_spec(&location, &spec_http).await?;
        if let Some(expected) = &config.spec_hash {
            loaded.verify_hash(expected, config.spec_hash_policy)?;
        }

        // 3. Base URL
        let base_url =
            determine_base_url(&loaded.spec, &loaded.location, config.base_url.as_deref())?;

        // 4. Authenticated client
        tracing::info!("Creating HTTP client");
        let auth = config.auth.resolve()?;
        let client = Arc::new(ApiClient::new(&base_url, &config.client, auth)?);
        *self.client.lock() = Some(Arc::clone(&client));

        // 5. Routes
        let resolver = OpenApiResolver::new(loaded.location.clone(), &loaded.spec, &spec_http)?;
        let operations = enumerate_operations(&loaded.spec, &resolver).await;
        let routes: Vec<HttpRoute> = operations.iter().map(|op| op.route.clone()).collect();

        // 6. Selection
        let mut selection = RouteMap::from_config(&config.routes)?;
        if config.restricts_to_mappings(&mappings) {
            tracing::info!(
                mapped = mappings.len(),
                "Restricting tools to mapped operations"
            );
            selection = selection.then(RouteMap::from_mappings(&routes, &mappings));
        }

        // 7. Tool generation
        tracing::info!(name = %config.name, "Creating MCP server");
        let source = OpenApiToolSource::generate(
            config.name.clone(),
            &operations,
            &selection,
            &resolver,
            client,
        )
        .await;

        // 8. Renaming
        let report = source.transform(&mut ToolTransformer::new(mappings))?;
        tracing::info!(
            tools = source.len(),
            renamed = report.renamed.len(),
            described = report.described.len(),
            unmatched = report.unmatched.len(),
            "MCP server built"
        );

        Ok(GatewayServer::new(
            metadata(config, &loaded, base_url),
            source,
            routes,
        ))
    }

    /// Close the upstream client. Safe to call more than once.
    pub fn cleanup(&self) {
        let slot = self.client.lock();
        if let Some(client) = slot.as_ref()
            && !client.is_closed()
        {
            tracing::info!("Closing HTTP client");
            client.close();
        }
    }
}

fn spec_http_client(config: &ServiceConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().user_agent(config.client.user_agent());
    if let Some(timeout) = config.client.timeout() {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(|e| {
        GatewayError::OpenApi(OpenApiToolsError::Startup(format!(
            "failed to build spec HTTP client: {e}"
        )))
    })
}

fn metadata(config: &ServiceConfig, loaded: &LoadedSpec, base_url: String) -> ServerMetadata {
    ServerMetadata {
        name: config.name.clone(),
        instructions: config.instructions.clone(),
        base_url,
        spec_location: loaded.location.to_string(),
        spec_sha256: loaded.raw_sha256.clone(),
        api_title: loaded.spec.info.title.clone(),
        api_version: loaded.spec.info.version.clone(),
    }
}
