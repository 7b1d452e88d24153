//! # Settlement Repository
//!
//! The atomic unit of work behind every settled sale.
//!
//! ## Cash Sale
//! ```text
//! BEGIN
//!   UPDATE products ... quantity >= N        ── 0 rows ──► re-read ──► ROLLBACK
//!   SELECT product (post-decrement snapshot)                (NotFound |
//!   INSERT sales                                            InsufficientStock)
//!   INSERT combined_sales
//! COMMIT
//! ```
//!
//! ## Mobile-Money Completion
//! ```text
//! BEGIN
//!   UPDATE mobile_money_transactions            ── 0 rows ──► ROLLBACK (duplicate)
//!      SET status = 'completed' WHERE status = 'pending'
//!   <cash sale steps, tag "mobile-money">       ── no stock ──► ROLLBACK
//! COMMIT                                                         then mark FAILED
//! ```
//!
//! Any error drops the transaction, which rolls everything back.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{ledger, mobile_money, product};
use crate::repository::mobile_money::MobileMoneyRepository;
use duka_core::{
    MobileMoneyTransaction, Money, PaymentMethod, Product, SaleDraft, SalePricing, SaleRecord,
    TransactionStatus, REASON_INSUFFICIENT_STOCK_AT_COMPLETION,
    REASON_PRODUCT_UNAVAILABLE_AT_COMPLETION,
};

// =============================================================================
// Inputs and Outcomes
// =============================================================================

/// What to settle.
#[derive(Debug, Clone)]
pub struct SaleRequest {
    pub organization_id: String,
    pub product_id: String,
    pub user_id: String,
    pub quantity: i64,
    pub pricing: SalePricing,
    pub payment_method: PaymentMethod,
    pub external_transaction_id: Option<String>,
}

/// A committed sale and the product as it stands after the decrement.
#[derive(Debug, Clone)]
pub struct SettledSale {
    pub sale: SaleRecord,
    pub product: Product,
}

impl SettledSale {
    pub fn remaining_quantity(&self) -> i64 {
        self.product.quantity
    }
}

/// Result of attempting to take stock.
#[derive(Debug, Clone)]
pub enum StockOutcome {
    Settled(SettledSale),
    /// Absent, inactive, or owned by another organization.
    ProductUnavailable,
    InsufficientStock { available: i64 },
}

/// Result of finalizing a confirmed mobile-money payment.
#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Completed(SettledSale),
    /// Someone else finalized it first; nothing was changed.
    AlreadyFinalized(TransactionStatus),
    /// Payment confirmed but the sale could not be honored; now FAILED.
    Failed { reason: &'static str },
}

// =============================================================================
// Repository
// =============================================================================

/// Runs settlement transactions.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Takes stock and writes the ledger pair in one transaction.
    pub async fn settle_sale(&self, request: &SaleRequest) -> DbResult<StockOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let outcome = settle_in(&mut tx, request, now).await?;

        match &outcome {
            StockOutcome::Settled(settled) => {
                tx.commit().await?;
                info!(
                    sale_id = %settled.sale.id,
                    product_id = %request.product_id,
                    quantity = request.quantity,
                    remaining = settled.remaining_quantity(),
                    payment_method = %request.payment_method,
                    "Sale settled"
                );
            }
            _ => tx.rollback().await?,
        }

        Ok(outcome)
    }

    /// Finalizes a PENDING mobile-money transaction whose payment the gateway
    /// confirmed.
    ///
    /// The ledger's external id is the gateway receipt, or the internal
    /// transaction id when the gateway sent none. The selling total is the
    /// amount recorded at initiation; `paid` is what the gateway reported,
    /// defaulting to that amount.
    pub async fn complete_mobile_money(
        &self,
        txn: &MobileMoneyTransaction,
        receipt: Option<&str>,
        paid: Option<Money>,
    ) -> DbResult<CompletionOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        if !mobile_money::claim_completed(&mut tx, &txn.transaction_id, receipt, now).await? {
            let status = mobile_money::fetch_status(&mut tx, &txn.transaction_id).await?;
            tx.rollback().await?;
            debug!(transaction_id = %txn.transaction_id, ?status, "Transaction already finalized");
            return Ok(CompletionOutcome::AlreadyFinalized(status));
        }

        let request = SaleRequest {
            organization_id: txn.organization_id.clone(),
            product_id: txn.product_id.clone(),
            user_id: txn.user_id.clone(),
            quantity: txn.quantity_sold,
            pricing: SalePricing::Agreed {
                total_selling: txn.amount(),
                paid: paid.unwrap_or_else(|| txn.amount()),
            },
            payment_method: PaymentMethod::MobileMoney,
            external_transaction_id: Some(
                receipt.unwrap_or(&txn.transaction_id).to_string(),
            ),
        };

        let reason = match settle_in(&mut tx, &request, now).await? {
            StockOutcome::Settled(settled) => {
                tx.commit().await?;
                info!(
                    transaction_id = %txn.transaction_id,
                    sale_id = %settled.sale.id,
                    receipt = ?receipt,
                    remaining = settled.remaining_quantity(),
                    "Mobile money sale completed"
                );
                return Ok(CompletionOutcome::Completed(settled));
            }
            StockOutcome::ProductUnavailable => REASON_PRODUCT_UNAVAILABLE_AT_COMPLETION,
            StockOutcome::InsufficientStock { available } => {
                warn!(
                    transaction_id = %txn.transaction_id,
                    product_id = %txn.product_id,
                    available,
                    requested = txn.quantity_sold,
                    "Paid mobile money sale can no longer be fulfilled"
                );
                REASON_INSUFFICIENT_STOCK_AT_COMPLETION
            }
        };

        tx.rollback().await?;

        let repo = MobileMoneyRepository::new(self.pool.clone());
        if repo.mark_failed(&txn.transaction_id, reason, now).await? {
            return Ok(CompletionOutcome::Failed { reason });
        }

        let current = repo
            .get(&txn.transaction_id)
            .await?
            .ok_or_else(|| DbError::not_found("MobileMoneyTransaction", &txn.transaction_id))?;
        Ok(CompletionOutcome::AlreadyFinalized(current.status))
    }
}

/// Cash-sale steps on an open transaction. Never commits.
async fn settle_in(
    conn: &mut SqliteConnection,
    request: &SaleRequest,
    now: DateTime<Utc>,
) -> DbResult<StockOutcome> {
    let taken = product::decrement_stock(
        conn,
        &request.organization_id,
        &request.product_id,
        request.quantity,
        now,
    )
    .await?;

    if !taken {
        let outcome =
            match product::fetch_active(conn, &request.organization_id, &request.product_id)
                .await?
            {
                None => StockOutcome::ProductUnavailable,
                Some(p) => StockOutcome::InsufficientStock {
                    available: p.quantity,
                },
            };
        return Ok(outcome);
    }

    let product = product::fetch_active(conn, &request.organization_id, &request.product_id)
        .await?
        .ok_or_else(|| DbError::not_found("Product", &request.product_id))?;

    let draft = SaleDraft::from_product(
        &product,
        &request.user_id,
        request.quantity,
        request.pricing,
        request.payment_method,
        request.external_transaction_id.clone(),
        now,
    );

    let sale = ledger::insert_pair(conn, &draft).await?;

    Ok(StockOutcome::Settled(SettledSale { sale, product }))
}

// =============================================================================
// Unit Tests
// =============================================================================
