//! # duka-db: Database Layer for Duka
//!
//! Persistence for the sale settlement engine: SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Duka Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler (POST /cash/sell)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     duka-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────────┐  ┌────────────┐  │   │
//! │  │   │   Database    │    │   Repositories     │  │ Migrations │  │   │
//! │  │   │   (pool.rs)   │    │                    │  │ (embedded) │  │   │
//! │  │   │               │    │ ProductRepository  │  │            │  │   │
//! │  │   │ SqlitePool    │◄───│ LedgerRepository   │  │ 001_init   │  │   │
//! │  │   │               │    │ MobileMoneyRepo    │  │            │  │   │
//! │  │   │               │    │ CredentialsRepo    │  │            │  │   │
//! │  │   │               │    │ SettlementRepo  ★  │  │            │  │   │
//! │  │   └───────────────┘    └────────────────────┘  └────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (WAL)                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ★ `SettlementRepository` owns the multi-table transactions: decrement,
//! ledger pair and (for mobile money) the status claim commit or roll back
//! together.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::credentials::CredentialsRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::mobile_money::MobileMoneyRepository;
pub use repository::product::ProductRepository;
pub use repository::settlement::{
    CompletionOutcome, SaleRequest, SettledSale, SettlementRepository, StockOutcome,
};
