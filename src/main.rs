//! Storage Replication Operator
//!
//! Serves the replication, volume-group-snapshot and connectivity extensions
//! over REST, with separate health and Prometheus metrics listeners.

use clap::Parser;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storage_replication_operator::{
    config::{self, DEFAULT_REPLICATION_PREFIX},
    domain::ports::ArrayConnectorRef,
    ApiServer, ApiServerConfig, ArrayConfig, Error, ExtensionService, GatewayConfig,
    GatewayConnector, InMemoryConnector, OperationMetrics, Result, ServiceConfig, SystemRegistry,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storage Replication Operator - replication and group snapshot extensions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Arrays file (YAML or JSON)
    #[arg(long, env = "ARRAYS_CONFIG")]
    arrays_config: Option<PathBuf>,

    /// System used for volume IDs that carry no system
    #[arg(long, env = "DEFAULT_SYSTEM_ID")]
    default_system_id: Option<String>,

    /// Prefix of the replication parameter keys
    #[arg(long, env = "REPLICATION_PREFIX", default_value = DEFAULT_REPLICATION_PREFIX)]
    replication_prefix: String,

    /// Array request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "120")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run against in-memory arrays instead of array gateways
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Storage Replication Operator");
    info!("  Version: {}", storage_replication_operator::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Standalone mode: {}", args.standalone);

    let metrics = Arc::new(OperationMetrics::new()?);
    let registry = Arc::new(build_registry(&args)?.with_metrics(metrics.clone()));
    info!(
        "System registry initialized ({} configured systems)",
        registry.stats().configured_systems
    );

    let probed = registry.probe_all().await;
    if probed == 0 {
        warn!("No array could be probed at startup; readiness stays false until one is");
    }

    let service_config = ServiceConfig {
        default_system_id: args.default_system_id.clone(),
        replication_prefix: args.replication_prefix.clone(),
    };
    let service = ExtensionService::with_metrics(registry.clone(), service_config, metrics.clone());
    if let Some(default) = service.default_system_id() {
        info!("  Default system: {}", default);
    }

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_registry = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_registry).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
    };
    let api_server = ApiServer::new(api_config, service);

    let shutdown = api_server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            let _ = shutdown.send(());
        }
    });

    api_server.run().await?;

    info!("Operator shutdown complete");
    Ok(())
}

// =============================================================================
// Registry Setup
// =============================================================================

fn build_registry(args: &Args) -> Result<SystemRegistry> {
    let arrays = match &args.arrays_config {
        Some(path) => config::load_arrays(path)?,
        None if args.standalone => vec![standalone_array()],
        None => {
            return Err(Error::Configuration(
                "--arrays-config is required unless running --standalone".into(),
            ))
        }
    };

    let connector: ArrayConnectorRef = if args.standalone {
        Arc::new(InMemoryConnector::new())
    } else {
        Arc::new(GatewayConnector::new(GatewayConfig {
            request_timeout: Duration::from_secs(args.request_timeout_secs),
            ..Default::default()
        }))
    };

    Ok(SystemRegistry::new(connector, arrays).with_default_system(args.default_system_id.clone()))
}

fn standalone_array() -> ArrayConfig {
    ArrayConfig {
        system_id: "standalone".to_string(),
        endpoint: "memory://standalone".to_string(),
        username: "admin".to_string(),
        password: "admin".to_string(),
        insecure: true,
        is_default: true,
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "tower=warn", "tower_http=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, registry: Arc<SystemRegistry>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let registry = registry.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let registry = registry.clone();
                async move {
                    let (status, body) = match req.uri().path() {
                        "/healthz" | "/livez" => (StatusCode::OK, "ok"),
                        "/readyz" if registry.any_probed() => (StatusCode::OK, "ok"),
                        "/readyz" => (StatusCode::SERVICE_UNAVAILABLE, "no system probed"),
                        _ => (StatusCode::NOT_FOUND, "not found"),
                    };
                    let mut response = Response::new(Body::from(body));
                    *response.status_mut() = status;
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<OperationMetrics>) -> Result<()> {
    use hyper::header::{HeaderValue, CONTENT_TYPE};
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = if req.uri().path() != "/metrics" {
                        let mut response = Response::new(Body::from("not found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        response
                    } else {
                        match metrics.render() {
                            Ok(text) => {
                                let mut response = Response::new(Body::from(text));
                                response.headers_mut().insert(
                                    CONTENT_TYPE,
                                    HeaderValue::from_static("text/plain; version=0.0.4"),
                                );
                                response
                            }
                            Err(e) => {
                                let mut response = Response::new(Body::from(e.to_string()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        }
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
