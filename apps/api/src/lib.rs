//! # Duka API
//!
//! HTTP front of the sale settlement engine.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Duka API Services                              │
//! │                                                                         │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌───────────────────┐ │
//! │  │  SettlementEngine  │  │ CallbackReconciler │  │ ReconciliationSweep│ │
//! │  │                    │  │                    │  │                   │ │
//! │  │ • sell_cash        │  │ • handle_callback  │  │ • run_once        │ │
//! │  │ • initiate_mobile_ │  │ • apply            │  │ • spawn (interval)│ │
//! │  │   money            │  │                    │  │                   │ │
//! │  └─────────┬──────────┘  └─────────┬──────────┘  └─────────┬─────────┘ │
//! │            │                       │                       │           │
//! │  ┌─────────▼───────────────────────▼───────────────────────▼────────┐  │
//! │  │  duka-db (SQLite, sqlx)          duka-mpesa (PaymentGateway)      │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config`] for the environment variables.

pub mod config;
pub mod error;
pub mod routes;
pub mod services;

use std::sync::Arc;

use duka_db::Database;
use duka_mpesa::PaymentGateway;

// Re-exports
pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, ErrorCode, SettlementError};
pub use routes::router;
pub use services::{
    CallbackReconciler, LoggingNotifier, ReconciliationSweep, ReorderNotifier, SettlementEngine,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: SettlementEngine,
    pub reconciler: CallbackReconciler,
}

impl AppState {
    /// Wires the services around one database and one gateway.
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn ReorderNotifier>,
        transaction_prefix: impl Into<String>,
    ) -> Self {
        let engine = SettlementEngine::new(
            db.clone(),
            gateway,
            Arc::clone(&notifier),
            transaction_prefix,
        );
        let reconciler = CallbackReconciler::new(db.clone(), notifier);

        AppState {
            db,
            engine,
            reconciler,
        }
    }
}
