//! # Reconciliation Sweep
//!
//! Catches transactions whose callback never arrived.
//!
//! ```text
//! every interval:
//!   PENDING older than stale_after (oldest first, batch_size at most)
//!     └── status query ──► Succeeded  ──► apply(Paid, no receipt)
//!                      ├─► Failed     ──► apply(Declined)
//!                      └─► Processing / error ──► left PENDING
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use duka_core::{MobileMoneyTransaction, StoredGatewayCredentials};
use duka_db::Database;
use duka_mpesa::{PaymentGateway, PushStatus};

use crate::error::SettlementError;
use crate::services::reconciler::{CallbackReconciler, GatewayResult, ReconcileOutcome};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub errors: usize,
}

/// Periodic status query of stale PENDING transactions.
#[derive(Clone)]
pub struct ReconciliationSweep {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    reconciler: CallbackReconciler,
    stale_after: Duration,
    batch_size: u32,
}

impl ReconciliationSweep {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        reconciler: CallbackReconciler,
        stale_after: Duration,
        batch_size: u32,
    ) -> Self {
        ReconciliationSweep {
            db,
            gateway,
            reconciler,
            stale_after,
            batch_size,
        }
    }

    /// Runs one pass.
    pub async fn run_once(&self) -> Result<SweepReport, SettlementError> {
        let stale_after =
            chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - stale_after;

        let stale = self
            .db
            .mobile_money()
            .list_stale_pending(cutoff, self.batch_size)
            .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..SweepReport::default()
        };

        for txn in &stale {
            match self.check(txn).await {
                Ok(Some(ReconcileOutcome::Completed { .. })) => report.completed += 1,
                Ok(Some(ReconcileOutcome::Failed { .. })) => report.failed += 1,
                Ok(None) => report.still_pending += 1,
                // A callback finalized it while we were asking.
                Err(SettlementError::DuplicateCallback(_)) => {}
                Err(e) => {
                    warn!(transaction_id = %txn.transaction_id, error = %e, "Sweep could not reconcile transaction");
                    report.errors += 1;
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                completed = report.completed,
                failed = report.failed,
                still_pending = report.still_pending,
                errors = report.errors,
                "Reconciliation sweep finished"
            );
        }

        Ok(report)
    }

    async fn check(
        &self,
        txn: &MobileMoneyTransaction,
    ) -> Result<Option<ReconcileOutcome>, SettlementError> {
        let creds = self
            .db
            .credentials()
            .get(&txn.organization_id)
            .await?
            .unwrap_or_else(|| StoredGatewayCredentials {
                organization_id: txn.organization_id.clone(),
                ..Default::default()
            })
            .complete()?;

        let result = match self
            .gateway
            .query_status(&creds, &txn.checkout_request_id)
            .await?
        {
            PushStatus::Succeeded => GatewayResult::Paid {
                receipt: None,
                amount_cents: None,
            },
            PushStatus::Failed {
                result_code,
                description,
            } => GatewayResult::Declined {
                result_code,
                description,
            },
            PushStatus::Processing => {
                debug!(transaction_id = %txn.transaction_id, "Still awaiting customer");
                return Ok(None);
            }
        };

        self.reconciler.apply(txn, result).await.map(Some)
    }

    /// Runs the sweep every `interval` until the handle is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!(error = %e, "Reconciliation sweep failed");
                }
            }
        })
    }
}
