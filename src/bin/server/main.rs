//! Kuba Namespace HTTP Server
//!
//! Serves the metric namespace over HTTP: Graphite-style find and render,
//! measurement ingestion and a handful of admin operations.
//!
//! # Endpoints
//!
//! ## Query
//! - `GET /metrics/find?query=` - Expand a pattern into branch and leaf nodes
//! - `GET /render?target=&from=&until=` - Resampled series for matching leaves
//!
//! ## Write
//! - `POST /api/v1/ingest` - Ingest a batch of measurement events
//!
//! ## Admin
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/v1/stats` - Namespace and cache statistics
//! - `POST /api/v1/links` - Create a link
//! - `POST /api/v1/delete` - Delete nodes
//! - `POST /api/v1/repair` - Repair a node's children list
//!
//! # CLI Commands
//!
//! - `start` - Start the HTTP server (default if no command specified)
//! - `check-config` - Validate configuration file
//! - `find <pattern>` - Resolve a pattern against the configured store
//! - `repair <name>` - Repair one node against the configured store
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `--config` flag
//! 2. `KNS_CONFIG` environment variable (path to TOML file)
//! 3. `./kuba-namespace.toml` in current directory
//! 4. Default configuration

mod config;
mod handlers;
mod types;

use clap::{Parser, Subcommand};

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use handlers::AppState;
use kuba_namespace::{
    config::{Config, FetchBackend, StoreBackend},
    fetch::{DatapointSource, FetchPool, Finder, FinderEntry, KairosDbClient, MemoryDatapointSource},
    ingest::{DatapointSink, IngestPipeline},
    metrics,
    redis::{util::sanitize_url, RedisNamespaceStore},
    store::{MemoryNamespaceStore, NamespaceStore},
    MetricNamespace,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

// =============================================================================
// Router and Server Setup
// =============================================================================

/// Build the application router
fn build_router(state: Arc<AppState>, cors_enabled: bool) -> Router {
    let router = Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Graphite-style query API
        .route("/metrics/find", get(handlers::find_metrics))
        .route("/render", get(handlers::render))
        // Write API
        .route("/api/v1/ingest", post(handlers::ingest))
        // Admin
        .route("/api/v1/stats", get(handlers::get_stats))
        .route("/api/v1/links", post(handlers::create_link))
        .route("/api/v1/delete", post(handlers::delete_nodes))
        .route("/api/v1/repair", post(handlers::repair))
        .with_state(state);

    if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Graceful shutdown signal handler
///
/// If a handler cannot be installed the failure is logged and that signal
/// source never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {},
            Err(e) => {
                warn!(error = %e, "Ctrl+C handler installation failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "SIGTERM handler installation failed");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

// =============================================================================
// Service Wiring
// =============================================================================

/// Backends selected by the configuration
struct Services {
    namespace: Arc<MetricNamespace>,
    source: Arc<dyn DatapointSource>,
    sink: Arc<dyn DatapointSink>,
}

/// Connect the namespace store
async fn init_store(config: &Config) -> Result<Arc<dyn NamespaceStore>, Box<dyn std::error::Error>> {
    match config.store.backend {
        StoreBackend::Memory => {
            debug!("Using in-memory namespace store");
            Ok(Arc::new(MemoryNamespaceStore::new()))
        },
        StoreBackend::Redis => {
            debug!("Connecting to Redis at {}...", sanitize_url(&config.store.redis_url));
            let store =
                RedisNamespaceStore::with_prefix(config.redis_config(), &config.store.key_prefix)
                    .await?;
            let latency = store.pool().ping().await?;
            debug!(latency_us = latency.as_micros() as u64, "Connected to Redis");
            Ok(Arc::new(store))
        },
    }
}

/// Validate `config`, then build the namespace and datapoint backends
async fn init_services(config: &Config) -> Result<Services, Box<dyn std::error::Error>> {
    config.validate()?;
    let store = init_store(config).await?;
    let namespace = Arc::new(MetricNamespace::new(store, config.namespace_config()));

    let (source, sink): (Arc<dyn DatapointSource>, Arc<dyn DatapointSink>) =
        match config.fetch.backend {
            FetchBackend::Memory => {
                debug!("Using in-memory datapoint store");
                let memory = Arc::new(MemoryDatapointSource::new());
                (
                    memory.clone() as Arc<dyn DatapointSource>,
                    memory as Arc<dyn DatapointSink>,
                )
            },
            FetchBackend::Kairosdb => {
                debug!(url = %config.fetch.kairosdb_url, "Using KairosDB datapoint store");
                let client = Arc::new(KairosDbClient::new(
                    config.fetch.kairosdb_url.clone(),
                    config.fetch_timeout(),
                )?);
                (
                    client.clone() as Arc<dyn DatapointSource>,
                    client as Arc<dyn DatapointSink>,
                )
            },
        };

    Ok(Services {
        namespace,
        source,
        sink,
    })
}

/// Install the tracing subscriber; `RUST_LOG` wins over the configured level
fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

// =============================================================================
// CLI Definition
// =============================================================================

/// Kuba Namespace - metric name index with glob queries and aliasing
#[derive(Parser)]
#[command(name = "kuba-namespace")]
#[command(author = "Victor Oseghale")]
#[command(version)]
#[command(about = "Hierarchical metric namespace with wildcard queries and links", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides KNS_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override listen address (e.g., 0.0.0.0:8090)
    #[arg(short, long, global = true)]
    listen: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Validate configuration file without starting the server
    CheckConfig,

    /// Resolve a pattern and print the matches
    Find {
        /// Dotted pattern, e.g. servers.web*.cpu
        pattern: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Repair one node's children list
    Repair {
        /// Node name
        name: String,
    },
}

// =============================================================================
// CLI Command Handlers
// =============================================================================

/// Validate configuration and print summary
fn cmd_check_config(config: &Config, path: Option<&PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    println!("Configuration is valid!");
    match path {
        Some(path) => println!("  Loaded from: {:?}", path),
        None => println!("  Using defaults"),
    }
    println!();
    println!("Server Settings:");
    println!("  Listen address: {}:{}", config.server.host, config.server.port);
    println!("  CORS enabled: {}", config.server.cors_enabled);
    println!();
    println!("Store Settings:");
    println!("  Backend: {:?}", config.store.backend);
    if config.store.backend == StoreBackend::Redis {
        println!("  URL: {}", sanitize_url(&config.store.redis_url));
        println!("  Key prefix: {}", config.store.key_prefix);
        println!("  Pool size: {}", config.store.pool_size);
    }
    println!();
    println!("Namespace Settings:");
    println!("  Minimum segments: {}", config.namespace.min_segments);
    println!("  Node cache capacity: {}", config.namespace.node_cache_capacity);
    println!("  Query cache TTL: {}s", config.namespace.query_cache_ttl_secs);
    if let Some(fragment) = &config.namespace.linkable_fragment {
        println!("  Linkable fragment: {}", fragment);
    }
    println!();
    println!("Fetch Settings:");
    println!("  Backend: {:?}", config.fetch.backend);
    if config.fetch.backend == FetchBackend::Kairosdb {
        println!("  KairosDB URL: {}", config.fetch.kairosdb_url);
    }
    println!("  Workers: {}", config.fetch.workers);
    println!();
    println!("Monitoring:");
    println!("  Prometheus enabled: {}", config.monitoring.metrics_enabled);
    println!("  Log level: {}", config.monitoring.log_level);

    Ok(())
}

/// Resolve a pattern against the configured store
async fn cmd_find(config: &Config, pattern: &str, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let services = init_services(config).await?;
    let pool = FetchPool::new(services.source, config.fetch.workers).with_max_slots(config.fetch.max_slots);
    let finder = Finder::new(services.namespace, pool);

    let entries: Vec<FinderEntry> = finder
        .find_nodes(pattern)
        .await
        .iter()
        .map(FinderEntry::from)
        .collect();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            let kind = if entry.leaf { "leaf" } else { "branch" };
            println!("{:<6} {}", kind, entry.path);
        }
        println!("{} match(es)", entries.len());
    }
    Ok(())
}

/// Repair one node against the configured store
async fn cmd_repair(config: &Config, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let services = init_services(config).await?;
    let outcome = services.namespace.repair_children(name).await?;
    println!("{}: {:?}", name, outcome);
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let (mut config, config_path) = config::load_config(cli.config.as_deref())?;
    if let Some(listen) = &cli.listen {
        let addr: SocketAddr = listen.parse()?;
        config.server.host = addr.ip().to_string();
        config.server.port = addr.port();
    }

    // Route to appropriate command handler
    match &cli.command {
        Some(Commands::CheckConfig) => return cmd_check_config(&config, config_path.as_ref()),
        Some(Commands::Find { pattern, format }) => {
            init_tracing(&config);
            return cmd_find(&config, pattern, format).await;
        },
        Some(Commands::Repair { name }) => {
            init_tracing(&config);
            return cmd_repair(&config, name).await;
        },
        Some(Commands::Start) | None => {
            // Continue with server startup below
        },
    }

    config.validate()?;
    init_tracing(&config);
    metrics::init();

    info!("Starting Kuba Namespace Server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        debug!("Configuration loaded from {:?}", path);
    }

    let services = init_services(&config).await?;
    info!(
        store = %services.namespace.store().store_id(),
        source = %services.source.source_id(),
        "Backends initialized"
    );

    let pool = FetchPool::new(services.source, config.fetch.workers).with_max_slots(config.fetch.max_slots);
    let finder = Finder::new(services.namespace.clone(), pool);
    let pipeline = IngestPipeline::new(services.namespace.clone(), services.sink)
        .with_receiver(config.fetch.receiver.clone());

    let state = Arc::new(AppState {
        namespace: services.namespace.clone(),
        finder,
        pipeline,
        metrics_enabled: config.monitoring.metrics_enabled,
        max_render_window_secs: config.fetch.max_render_window_secs,
    });

    // Expired query results are otherwise only dropped when looked up again
    if config.monitoring.cache_purge_interval_secs > 0 {
        let namespace = services.namespace.clone();
        let period = Duration::from_secs(config.monitoring.cache_purge_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // Skip first immediate tick

            loop {
                interval.tick().await;
                let purged = namespace.query_cache().purge_expired();
                if purged > 0 {
                    debug!(purged, "Purged expired query cache entries");
                }
            }
        });
    }

    let app = build_router(state, config.server.cors_enabled);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    metrics::HEALTH_STATUS.set(0.0);
    info!("Server shutdown complete");
    Ok(())
}
