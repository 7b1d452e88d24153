//! # Duka API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cashier app ──► HTTP (8080) ──► SettlementEngine ──► SQLite           │
//! │                                       │                                 │
//! │  Daraja ──► /mpesa/callback           ▼                                 │
//! │                 │               Daraja STK push                         │
//! │                 ▼                                                       │
//! │        CallbackReconciler ◄── ReconciliationSweep (interval)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duka_api::{
    router, ApiConfig, AppState, CallbackReconciler, LoggingNotifier, ReconciliationSweep,
    ReorderNotifier,
};
use duka_db::{Database, DbConfig};
use duka_mpesa::{DarajaClient, PaymentGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    init_tracing();

    info!("Starting Duka API server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        port = config.http_port,
        database = %config.database_path,
        mpesa_environment = ?config.mpesa_environment,
        "Configuration loaded"
    );

    // Open database (runs migrations)
    let db = Database::new(
        DbConfig::new(&config.database_path).max_connections(config.db_max_connections),
    )
    .await
    .context("failed to open database")?;
    info!("Database ready");

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        DarajaClient::new(config.daraja_config()).context("failed to build gateway client")?,
    );
    let notifier: Arc<dyn ReorderNotifier> = Arc::new(LoggingNotifier);

    let state = AppState::new(
        db.clone(),
        Arc::clone(&gateway),
        Arc::clone(&notifier),
        config.transaction_id_prefix.clone(),
    );

    let sweep = if config.reconcile_enabled() {
        let sweep = ReconciliationSweep::new(
            db.clone(),
            gateway,
            CallbackReconciler::new(db.clone(), notifier),
            config.reconcile_stale_after,
            config.reconcile_batch_size,
        );
        info!(
            interval_secs = config.reconcile_interval.as_secs(),
            "Reconciliation sweep enabled"
        );
        Some(sweep.spawn(config.reconcile_interval))
    } else {
        warn!("Reconciliation sweep disabled");
        None
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweep {
        handle.abort();
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
