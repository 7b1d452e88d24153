//! # duka-core: Pure Business Logic for Duka
//!
//! Domain model and rules of the sale settlement engine, as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Duka Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    apps/api (axum)                              │   │
//! │  │   /cash/sell ──► /sell-product ──► /mpesa/callback              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ duka-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ settlement │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │ SaleTotals │  │  phone    │  │   │
//! │  │   │ SaleRecord│  │           │  │ SaleDraft  │  │  quantity │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        duka-db (SQLite)        duka-mpesa (Daraja gateway)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, SaleRecord, MobileMoneyTransaction, ...)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`settlement`] - Sale arithmetic and ledger entry construction
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation and phone normalization
//!
//! ## Example Usage
//!
//! ```rust
//! use duka_core::money::Money;
//! use duka_core::settlement::SaleTotals;
//!
//! let totals = SaleTotals::compute(
//!     Money::from_cents(50),
//!     Money::from_cents(80),
//!     3,
//!     Money::from_cents(300),
//! );
//!
//! assert_eq!(totals.total_cost.cents(), 150);
//! assert_eq!(totals.total_selling.cents(), 240);
//! assert_eq!(totals.profit.cents(), 90);
//! assert_eq!(totals.balance.cents(), 60);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use settlement::{SaleDraft, SalePricing, SaleTotals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single product in one sale.
///
/// Guards the `quantity * price` products against overflow and catches
/// fat-fingered input (1000000 instead of 10).
pub const MAX_SALE_QUANTITY: i64 = 100_000;

/// Default prefix for client-less mobile-money transaction ids.
pub const DEFAULT_TRANSACTION_PREFIX: &str = "DK";

/// Failure reason recorded when stock ran out between initiation and callback.
pub const REASON_INSUFFICIENT_STOCK_AT_COMPLETION: &str = "insufficient_stock_at_completion";

/// Failure reason recorded when the product was deactivated before completion.
pub const REASON_PRODUCT_UNAVAILABLE_AT_COMPLETION: &str = "product_unavailable_at_completion";
