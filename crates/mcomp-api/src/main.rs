//! Compression service binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcomp_api::{create_router, metrics, ApiConfig, AppState};
use mcomp_worker::{Scheduler, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing()?;

    info!("Starting mcomp-server v{}", env!("CARGO_PKG_VERSION"));

    let worker_config = WorkerConfig::from_env();
    let api_config = ApiConfig::from_env();
    info!(
        max_concurrent = worker_config.max_concurrent_processes,
        per_hour = worker_config.max_files_per_hour,
        per_day = worker_config.max_files_per_day,
        timeout_secs = worker_config.process_timeout.as_secs(),
        work_dir = %worker_config.work_dir.display(),
        "Worker config loaded"
    );
    info!("API config: host={}, port={}", api_config.host, api_config.port);
    if api_config.admin_token.is_none() {
        warn!("ADMIN_TOKEN is not set, /admin routes are disabled");
    }

    let transcoder = mcomp_media::detect_transcoder();
    let scheduler = Arc::new(
        Scheduler::start(worker_config, transcoder).context("failed to start scheduler")?,
    );
    let cleanup_task = scheduler.spawn_cleanup_task();

    let metrics_handle = if api_config.metrics_enabled {
        match metrics::init_metrics() {
            Ok(handle) => {
                info!("Prometheus metrics enabled at /metrics");
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to install metrics recorder: {}", e);
                None
            }
        }
    } else {
        None
    };

    let state = AppState::new(api_config.clone(), Arc::clone(&scheduler));
    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = api_config
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", api_config.bind_address()))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("HTTP server stopped, draining jobs");
    let removed = scheduler.shutdown().await;
    cleanup_task.abort();
    info!(removed, "Shutdown complete");

    Ok(())
}

/// JSON output when `LOG_FORMAT=json`, coloured text otherwise.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("mcomp=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
