//! # Callback Reconciler
//!
//! Applies the gateway's verdict on a PENDING mobile-money transaction.
//!
//! ## Outcome Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /mpesa/callback ──► parse ──► correlate ──┐                       │
//! │                                                 │                       │
//! │  sweep: status query ───────────────────────────┤                       │
//! │                                                 ▼                       │
//! │                                      apply(txn, GatewayResult)          │
//! │                                                 │                       │
//! │              Declined ──► mark_failed (pending → failed)                │
//! │              Paid ─────► complete_mobile_money                          │
//! │                            (claim + decrement + ledger, one tx)         │
//! │                            selling total as requested, cash as paid     │
//! │                                                                         │
//! │  A transition that finds the row already terminal is a duplicate and   │
//! │  changes nothing.                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use duka_core::{MobileMoneyTransaction, Money};
use duka_db::{CompletionOutcome, Database};
use duka_mpesa::StkCallback;

use crate::error::SettlementError;
use crate::services::notifier::{dispatch_reorder, ReorderNotifier};

/// Reason recorded when a decline carries no description.
const DEFAULT_DECLINE_REASON: &str = "payment declined";

/// The gateway's verdict, whichever way it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResult {
    Paid {
        receipt: Option<String>,
        amount_cents: Option<i64>,
    },
    Declined {
        result_code: i64,
        description: String,
    },
}

impl GatewayResult {
    /// Reads the verdict off a parsed callback.
    pub fn from_callback(callback: &StkCallback) -> Self {
        if callback.is_success() {
            GatewayResult::Paid {
                receipt: callback.receipt(),
                amount_cents: callback.amount_cents(),
            }
        } else {
            GatewayResult::Declined {
                result_code: callback.result_code().unwrap_or(-1),
                description: callback.result_desc.clone(),
            }
        }
    }
}

/// What applying a verdict did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Stock taken and the sale recorded.
    Completed {
        transaction_id: String,
        sale_id: String,
    },
    /// Transaction moved to FAILED.
    Failed {
        transaction_id: String,
        reason: String,
    },
}

/// Finalizes mobile-money transactions.
#[derive(Clone)]
pub struct CallbackReconciler {
    db: Database,
    notifier: Arc<dyn ReorderNotifier>,
}

impl CallbackReconciler {
    pub fn new(db: Database, notifier: Arc<dyn ReorderNotifier>) -> Self {
        CallbackReconciler { db, notifier }
    }

    /// Processes a raw callback body.
    ///
    /// ## Errors
    /// - `InvalidInput` for a payload that is not a callback envelope
    /// - `NotFound` when no transaction carries its correlation ids
    /// - `DuplicateCallback` when the transaction is already terminal
    ///
    /// The HTTP layer acknowledges all of these; the gateway must not retry.
    pub async fn handle_callback(&self, body: &[u8]) -> Result<ReconcileOutcome, SettlementError> {
        let callback = StkCallback::from_slice(body).map_err(|e| {
            warn!(error = %e, "Malformed STK callback");
            SettlementError::InvalidInput(format!("malformed callback: {}", e))
        })?;

        debug!(
            merchant_request_id = %callback.merchant_request_id,
            checkout_request_id = %callback.checkout_request_id,
            result_code = ?callback.result_code(),
            "STK callback received"
        );

        let txn = self
            .db
            .mobile_money()
            .find_by_correlation(&callback.merchant_request_id, &callback.checkout_request_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    merchant_request_id = %callback.merchant_request_id,
                    checkout_request_id = %callback.checkout_request_id,
                    "STK callback matches no transaction"
                );
                SettlementError::NotFound(format!(
                    "No transaction for checkout request {}",
                    callback.checkout_request_id
                ))
            })?;

        if txn.status.is_terminal() {
            warn!(
                transaction_id = %txn.transaction_id,
                status = ?txn.status,
                "Duplicate STK callback ignored"
            );
            return Err(SettlementError::DuplicateCallback(txn.transaction_id));
        }

        self.apply(&txn, GatewayResult::from_callback(&callback)).await
    }

    /// Applies a verdict to a transaction read as PENDING.
    pub async fn apply(
        &self,
        txn: &MobileMoneyTransaction,
        result: GatewayResult,
    ) -> Result<ReconcileOutcome, SettlementError> {
        match result {
            GatewayResult::Declined {
                result_code,
                description,
            } => {
                let reason = if description.trim().is_empty() {
                    DEFAULT_DECLINE_REASON.to_string()
                } else {
                    description
                };

                let changed = self
                    .db
                    .mobile_money()
                    .mark_failed(&txn.transaction_id, &reason, Utc::now())
                    .await?;
                if !changed {
                    debug!(transaction_id = %txn.transaction_id, "Decline arrived after finalization");
                    return Err(SettlementError::DuplicateCallback(txn.transaction_id.clone()));
                }

                info!(
                    transaction_id = %txn.transaction_id,
                    result_code,
                    reason = %reason,
                    "Mobile money payment declined"
                );
                Ok(ReconcileOutcome::Failed {
                    transaction_id: txn.transaction_id.clone(),
                    reason,
                })
            }

            GatewayResult::Paid {
                receipt,
                amount_cents,
            } => {
                if let Some(paid) = amount_cents {
                    if paid < txn.amount_cents {
                        warn!(
                            transaction_id = %txn.transaction_id,
                            paid_cents = paid,
                            expected_cents = txn.amount_cents,
                            "Paid amount lower than requested"
                        );
                    }
                }

                let paid = amount_cents.map(Money::from_cents);
                match self
                    .db
                    .settlement()
                    .complete_mobile_money(txn, receipt.as_deref(), paid)
                    .await?
                {
                    CompletionOutcome::Completed(settled) => {
                        dispatch_reorder(&self.notifier, &settled.product);
                        Ok(ReconcileOutcome::Completed {
                            transaction_id: txn.transaction_id.clone(),
                            sale_id: settled.sale.id,
                        })
                    }
                    CompletionOutcome::AlreadyFinalized(status) => {
                        debug!(transaction_id = %txn.transaction_id, ?status, "Payment arrived after finalization");
                        Err(SettlementError::DuplicateCallback(txn.transaction_id.clone()))
                    }
                    CompletionOutcome::Failed { reason } => Ok(ReconcileOutcome::Failed {
                        transaction_id: txn.transaction_id.clone(),
                        reason: reason.to_string(),
                    }),
                }
            }
        }
    }
}
