//! Spawn Resolver Service Binary
//!
//! Serves `/get_seeds` over HTTP, loading overlap tables from object storage.
//!
//! ## Configuration
//!
//! Environment variables (see [`ServiceConfig::from_env`]):
//! - `HOST` / `PORT`: bind address (default: 0.0.0.0:4001)
//! - `STORAGE_BASE_URL`: object storage endpoint (default: https://storage.googleapis.com)
//! - `FETCH_TIMEOUT_SECS`: table download timeout (default: 30)
//! - `CACHE_MAX_ENTRIES` / `CACHE_ENABLED` / `CACHE_COMPRESS`: table cache
//! - `DEFAULT_MATCH_RATIO`: ratio for requests without one (default: 0.6)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! PORT=4001 cargo run --bin spawn_resolver_service --features service
//! ```

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use spawn_resolver::config::{LogFormat, ServiceConfig};
use spawn_resolver::service::{create_router, ServiceState};
use spawn_resolver::store::HttpTableSource;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "spawn_resolver_service=info,spawn_resolver=info,tower_http=info".into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .init(),
    }
}

/// Request logging middleware that adds a trace ID and timing.
async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = request
        .headers()
        .get("X-Cloud-Trace-Context")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split('/').next().unwrap_or(s).to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    span.record("status", status);
    span.record("latency_ms", latency_ms);

    info!(
        target: "spawn_resolver_service::access",
        trace_id = %trace_id,
        method = %method,
        path = %path,
        status,
        latency_ms,
        "request completed"
    );

    response
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format);

    let version = env!("CARGO_PKG_VERSION");
    info!(
        version,
        build_sha = option_env!("BUILD_SHA").unwrap_or("dev"),
        "Starting Spawn Resolver Service"
    );

    let origin = HttpTableSource::new(&config.storage_base_url, config.fetch_timeout)?;
    info!(
        storage_base_url = %config.storage_base_url,
        fetch_timeout_secs = config.fetch_timeout.as_secs(),
        cache_enabled = config.cache.enabled,
        cache_max_entries = config.cache.max_entries,
        cache_compress = config.cache.compress,
        default_match_ratio = config.default_match_ratio,
        "Table source initialized"
    );

    let state = ServiceState::from_config(origin, &config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = config.bind_addr().parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, version, "Spawn Resolver Service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Spawn Resolver Service shutdown complete");
    Ok(())
}
