//! # Repositories
//!
//! One repository per table, plus the settlement unit of work.
//!
//! ```text
//! product        products                   catalog reads, conditional decrement
//! ledger         sales + combined_sales     write-once ledger pair
//! mobile_money   mobile_money_transactions  STK push lifecycle
//! credentials    gateway_credentials        per-organization gateway config
//! settlement     (all of the above)         atomic multi-table transactions
//! ```
//!
//! Functions taking `&mut SqliteConnection` run inside a caller's
//! transaction; methods on the repository structs use the pool directly.

pub mod credentials;
pub mod ledger;
pub mod mobile_money;
pub mod product;
pub mod settlement;
