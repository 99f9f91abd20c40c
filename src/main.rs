use axum::extract::DefaultBodyLimit;
use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use model_gen_proxy::app_state::AppState;
use model_gen_proxy::config::AppConfig;
use model_gen_proxy::routes;
use model_gen_proxy::services::{
    cache::{RedisStatusCache, StatusCache},
    orchestrator::Orchestrator,
    provider::TripoClient,
    registry::JobRegistry,
    storage::{AssetStore, R2AssetStore},
};

/// Multipart framing on top of the largest accepted image.
const BODY_OVERHEAD: usize = 64 * 1024;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing model-gen-proxy server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Initialize object storage client
    tracing::info!(bucket = %config.storage_bucket, "Initializing object storage client");
    let storage: Arc<dyn AssetStore> = Arc::new(
        R2AssetStore::new(
            &config.storage_bucket,
            &config.storage_endpoint,
            &config.storage_region,
            &config.storage_access_key,
            &config.storage_secret_key,
            config.storage_public_base_url.as_deref(),
            Duration::from_millis(config.storage_timeout_ms),
        )
        .expect("Failed to initialize object storage client"),
    );

    // Initialize optional Redis status cache
    let cache: Option<Arc<dyn StatusCache>> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting Redis status cache");
            let cache: Arc<dyn StatusCache> = Arc::new(
                RedisStatusCache::new(url, config.status_cache_ttl_secs)
                    .expect("Failed to initialize status cache"),
            );
            Some(cache)
        }
        None => {
            tracing::info!("REDIS_URL not set, status cache disabled");
            None
        }
    };

    // Initialize Tripo AI client
    tracing::info!(api_url = %config.tripo_api_url, "Initializing Tripo AI client");
    let provider = TripoClient::new(
        &config.tripo_api_url,
        Duration::from_millis(config.tripo_api_timeout_ms),
        Duration::from_millis(config.tripo_download_timeout_ms),
        config.retry_policy(),
    )
    .expect("Failed to initialize Tripo AI client");

    let orchestrator = Orchestrator::new(
        Arc::new(provider),
        Arc::clone(&storage),
        Arc::new(JobRegistry::new()),
        cache.clone(),
        config.orchestrator_settings(),
    );
    orchestrator.spawn_eviction_sweep(Duration::from_secs(config.eviction_interval_secs));

    // Create shared application state
    let state = AppState::new(orchestrator.clone(), storage, cache);

    let body_limit = config.max_file_size + BODY_OVERHEAD;

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route(
            "/api/v1/models",
            get(routes::models::list_jobs).post(routes::models::submit_generation),
        )
        .route(
            "/api/v1/models/{job_id}/status",
            get(routes::models::get_job_status),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit));

    tracing::info!("Starting model-gen-proxy on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server stopped accepting connections, stopping job tasks");
    if orchestrator.shutdown().await {
        tracing::info!("Graceful shutdown complete");
    } else {
        tracing::warn!("Shutdown finished with job tasks still running");
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
