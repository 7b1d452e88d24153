//! # Services
//!
//! ```text
//! services/
//! ├── settlement.rs  ◄─── cash sales, STK push initiation
//! ├── reconciler.rs  ◄─── gateway verdicts (callback and sweep)
//! ├── sweep.rs       ◄─── periodic status query of stale PENDING rows
//! └── notifier.rs    ◄─── low-stock alerts
//! ```

pub mod notifier;
pub mod reconciler;
pub mod settlement;
pub mod sweep;

pub use notifier::{dispatch_reorder, LoggingNotifier, ReorderNotifier};
pub use reconciler::{CallbackReconciler, GatewayResult, ReconcileOutcome};
pub use settlement::{
    CashReceipt, CashSaleRequest, MobileMoneyInitiation, MobileMoneySaleRequest, SettlementEngine,
};
pub use sweep::{ReconciliationSweep, SweepReport};
