use anyhow::Context as _;
use apigate::config::{ServiceConfig, Transport};
use apigate::factory::GatewayFactory;
use apigate::inspect::inspect_components;
use apigate::server::GatewayServer;
use clap::{Parser, ValueEnum};
use rmcp::ServiceExt as _;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "apigate", version)]
#[command(about = "Expose an OpenAPI-described HTTP API as MCP tools")]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(long, short = 'c', env = "APIGATE_CONFIG")]
    config: Option<PathBuf>,

    /// `OpenAPI` document path or URL (overrides `openapi`)
    #[arg(long, env = "APIGATE_OPENAPI")]
    openapi: Option<String>,

    /// Tool mappings JSON file (overrides `toolMappingsFile`)
    #[arg(long, env = "APIGATE_TOOL_MAPPINGS")]
    tool_mappings: Option<PathBuf>,

    /// Upstream API base URL (overrides `baseUrl`)
    #[arg(long, env = "APIGATE_BASE_URL")]
    base_url: Option<String>,

    /// MCP server name (overrides `name`)
    #[arg(long)]
    name: Option<String>,

    /// Listen address for streamable HTTP (overrides `server.bind`)
    #[arg(long, env = "APIGATE_BIND")]
    bind: Option<String>,

    /// MCP transport (overrides `server.transport`)
    #[arg(long, value_enum)]
    transport: Option<Transport>,

    /// Log level filter; `RUST_LOG` takes precedence
    #[arg(long, env = "APIGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Print the generated components and exit
    #[arg(long)]
    list_tools: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let config = load_config(&cli)?;
    config.validate()?;

    let factory = GatewayFactory::new(config);
    let server = factory.build().await?;
    let summary = inspect_components(&server);

    if cli.list_tools {
        print!("{summary}");
        factory.cleanup();
        return Ok(());
    }

    let result = match factory.config().server.transport {
        Transport::StreamableHttp => serve_http(factory.config(), server).await,
        Transport::Stdio => serve_stdio(server).await,
    };
    factory.cleanup();
    result
}

/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(openapi) = &cli.openapi {
        config.openapi.clone_from(openapi);
    }
    if let Some(file) = &cli.tool_mappings {
        config.tool_mappings_file = Some(file.clone());
    }
    if let Some(url) = &cli.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(name) = &cli.name {
        config.name.clone_from(name);
    }
    if let Some(bind) = &cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(transport) = cli.transport {
        config.server.transport = transport;
    }
    Ok(config)
}

async fn serve_http(config: &ServiceConfig, server: GatewayServer) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let app = apigate::http::router(server, &config.server.path);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        mcp_path = %config.server.path,
        "Serving MCP over streamable HTTP"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server")?;
    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn serve_stdio(server: GatewayServer) -> anyhow::Result<()> {
    tracing::info!("Serving MCP over stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("start stdio transport")?;

    tokio::select! {
        quit = service.waiting() => {
            let reason = quit.context("stdio service task")?;
            tracing::info!(reason = ?reason, "stdio session ended");
        }
        () = shutdown_signal() => {}
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
