use std::sync::Arc;
use std::time::Duration;

use slotd::clock::SystemClock;
use slotd::engine::{Engine, EngineConfig};
use slotd::notify::{LogConfirmation, NotifyHub};
use slotd::{observability, wire};

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let bind = std::env::var("SLOTD_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env_parse("SLOTD_PORT", 8080);
    let metrics_port: Option<u16> = std::env::var("SLOTD_METRICS_PORT")
        .ok()
        .and_then(|v| v.parse().ok());
    let txn_timeout_ms: u64 = env_parse("SLOTD_TXN_TIMEOUT_MS", 10_000);

    observability::init(metrics_port)?;

    let config = EngineConfig {
        txn_timeout: Duration::from_millis(txn_timeout_ms),
        ..EngineConfig::default()
    };
    let notify = Arc::new(NotifyHub::new(Arc::new(LogConfirmation)));
    let engine = Arc::new(Engine::new(Arc::new(SystemClock), notify, config));

    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "slotd listening");

    axum::serve(listener, wire::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => tracing::error!(%err, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("ctrl-c received, shutting down"),
        _ = terminate => tracing::info!("SIGTERM received, shutting down"),
    }
}
