//! # Mobile Money Repository
//!
//! Persistence for STK push transactions.
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  insert_pending ──► PENDING                                         │
//! │                        │                                            │
//! │         claim_completed│(conn)          mark_failed                 │
//! │      WHERE status =    │                WHERE status = 'pending'    │
//! │         'pending'      ▼                        │                   │
//! │                    COMPLETED                 FAILED                 │
//! │                                                                     │
//! │  rows_affected = 0 on either transition means another callback     │
//! │  (or the sweep) already finalized the transaction.                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use duka_core::{MobileMoneyTransaction, TransactionStatus};

const TRANSACTION_COLUMNS: &str = r#"
    transaction_id, organization_id, user_id, product_id, quantity_sold,
    phone, amount_cents, merchant_request_id, checkout_request_id,
    status, receipt, failure_reason, created_at, updated_at
"#;

/// Repository for mobile-money transactions.
#[derive(Debug, Clone)]
pub struct MobileMoneyRepository {
    pool: SqlitePool,
}

impl MobileMoneyRepository {
    /// Creates a new MobileMoneyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MobileMoneyRepository { pool }
    }

    /// Persists a freshly initiated transaction in PENDING.
    ///
    /// ## Errors
    /// `UniqueViolation` when the transaction id or checkout request id is
    /// already recorded.
    pub async fn insert_pending(&self, txn: &MobileMoneyTransaction) -> DbResult<()> {
        debug!(
            transaction_id = %txn.transaction_id,
            checkout_request_id = %txn.checkout_request_id,
            "Recording pending mobile money transaction"
        );

        sqlx::query(
            r#"
            INSERT INTO mobile_money_transactions (
                transaction_id, organization_id, user_id, product_id, quantity_sold,
                phone, amount_cents, merchant_request_id, checkout_request_id,
                status, receipt, failure_reason, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, NULL, ?11, ?12)
            "#,
        )
        .bind(&txn.transaction_id)
        .bind(&txn.organization_id)
        .bind(&txn.user_id)
        .bind(&txn.product_id)
        .bind(txn.quantity_sold)
        .bind(&txn.phone)
        .bind(txn.amount_cents)
        .bind(&txn.merchant_request_id)
        .bind(&txn.checkout_request_id)
        .bind(TransactionStatus::Pending)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a transaction by its internal id.
    pub async fn get(&self, transaction_id: &str) -> DbResult<Option<MobileMoneyTransaction>> {
        let sql = format!(
            "SELECT {} FROM mobile_money_transactions WHERE transaction_id = ?1",
            TRANSACTION_COLUMNS
        );

        let txn = sqlx::query_as::<_, MobileMoneyTransaction>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Finds the transaction a callback refers to.
    ///
    /// Matches on the merchant request id OR the checkout request id; the
    /// checkout id is unique, so it wins when both match different rows.
    pub async fn find_by_correlation(
        &self,
        merchant_request_id: &str,
        checkout_request_id: &str,
    ) -> DbResult<Option<MobileMoneyTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM mobile_money_transactions
            WHERE checkout_request_id = ?2 OR merchant_request_id = ?1
            ORDER BY (checkout_request_id = ?2) DESC, created_at DESC
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        );

        let txn = sqlx::query_as::<_, MobileMoneyTransaction>(&sql)
            .bind(merchant_request_id)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(txn)
    }

    /// Transitions PENDING → FAILED. Returns `false` if already terminal.
    pub async fn mark_failed(
        &self,
        transaction_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(transaction_id = %transaction_id, reason = %reason, "Marking transaction failed");

        let result = sqlx::query(
            r#"
            UPDATE mobile_money_transactions
            SET status = ?2, failure_reason = ?3, updated_at = ?4
            WHERE transaction_id = ?1 AND status = ?5
            "#,
        )
        .bind(transaction_id)
        .bind(TransactionStatus::Failed)
        .bind(reason)
        .bind(now)
        .bind(TransactionStatus::Pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// PENDING transactions created before `older_than`, oldest first.
    pub async fn list_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> DbResult<Vec<MobileMoneyTransaction>> {
        let sql = format!(
            r#"
            SELECT {} FROM mobile_money_transactions
            WHERE status = ?1 AND julianday(created_at) < julianday(?2)
            ORDER BY julianday(created_at)
            LIMIT ?3
            "#,
            TRANSACTION_COLUMNS
        );

        let txns = sqlx::query_as::<_, MobileMoneyTransaction>(&sql)
            .bind(TransactionStatus::Pending)
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(txns)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Claims a PENDING transaction as COMPLETED on the caller's transaction.
///
/// Returns `false` when it was already terminal; the caller must then roll
/// back without touching stock or the ledger.
pub async fn claim_completed(
    conn: &mut SqliteConnection,
    transaction_id: &str,
    receipt: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE mobile_money_transactions
        SET status = ?2, receipt = ?3, updated_at = ?4
        WHERE transaction_id = ?1 AND status = ?5
        "#,
    )
    .bind(transaction_id)
    .bind(TransactionStatus::Completed)
    .bind(receipt)
    .bind(now)
    .bind(TransactionStatus::Pending)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Reads a transaction's current status inside a transaction.
pub async fn fetch_status(
    conn: &mut SqliteConnection,
    transaction_id: &str,
) -> DbResult<TransactionStatus> {
    let status: Option<TransactionStatus> = sqlx::query_scalar(
        "SELECT status FROM mobile_money_transactions WHERE transaction_id = ?1",
    )
    .bind(transaction_id)
    .fetch_optional(&mut *conn)
    .await?;

    status.ok_or_else(|| DbError::not_found("MobileMoneyTransaction", transaction_id))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::generate_product_id;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use duka_core::{generate_transaction_id, Product};

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            organization_id: "org-1".to_string(),
            name: "Cooking Oil 1L".to_string(),
            category: "Grocery".to_string(),
            buying_price_cents: 20000,
            selling_price_cents: 25000,
            quantity: 5,
            reorder_level: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        (db, product.id)
    }

    fn pending(product_id: &str, checkout: &str, created_at: DateTime<Utc>) -> MobileMoneyTransaction {
        MobileMoneyTransaction {
            transaction_id: generate_transaction_id("DK", created_at),
            organization_id: "org-1".to_string(),
            user_id: "cashier-1".to_string(),
            product_id: product_id.to_string(),
            quantity_sold: 1,
            phone: "254712345678".to_string(),
            amount_cents: 25000,
            merchant_request_id: format!("m-{}", checkout),
            checkout_request_id: checkout.to_string(),
            status: TransactionStatus::Pending,
            receipt: None,
            failure_reason: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn test_insert_and_correlate() {
        let (db, product_id) = setup().await;
        let txn = pending(&product_id, "ws_CO_1", Utc::now());
        db.mobile_money().insert_pending(&txn).await.unwrap();

        let by_checkout = db
            .mobile_money()
            .find_by_correlation("unknown", "ws_CO_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_checkout.transaction_id, txn.transaction_id);
        assert_eq!(by_checkout.status, TransactionStatus::Pending);

        let by_merchant = db
            .mobile_money()
            .find_by_correlation("m-ws_CO_1", "unknown")
            .await
            .unwrap();
        assert!(by_merchant.is_some());

        assert!(db
            .mobile_money()
            .find_by_correlation("nope", "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_checkout_id_rejected() {
        let (db, product_id) = setup().await;
        db.mobile_money()
            .insert_pending(&pending(&product_id, "ws_CO_dup", Utc::now()))
            .await
            .unwrap();

        let err = db
            .mobile_money()
            .insert_pending(&pending(&product_id, "ws_CO_dup", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_mark_failed_only_once() {
        let (db, product_id) = setup().await;
        let txn = pending(&product_id, "ws_CO_2", Utc::now());
        db.mobile_money().insert_pending(&txn).await.unwrap();

        let repo = db.mobile_money();
        assert!(repo.mark_failed(&txn.transaction_id, "Request cancelled by user", Utc::now()).await.unwrap());
        assert!(!repo.mark_failed(&txn.transaction_id, "again", Utc::now()).await.unwrap());

        let stored = repo.get(&txn.transaction_id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("Request cancelled by user"));
    }

    #[tokio::test]
    async fn test_claim_completed_is_exclusive() {
        let (db, product_id) = setup().await;
        let txn = pending(&product_id, "ws_CO_3", Utc::now());
        db.mobile_money().insert_pending(&txn).await.unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        assert!(claim_completed(&mut conn, &txn.transaction_id, Some("QK9"), Utc::now()).await.unwrap());
        assert!(!claim_completed(&mut conn, &txn.transaction_id, Some("QK9"), Utc::now()).await.unwrap());
        assert_eq!(
            fetch_status(&mut conn, &txn.transaction_id).await.unwrap(),
            TransactionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_list_stale_pending() {
        let (db, product_id) = setup().await;
        let now = Utc::now();
        let old = pending(&product_id, "ws_CO_old", now - Duration::minutes(10));
        let fresh = pending(&product_id, "ws_CO_new", now);
        db.mobile_money().insert_pending(&old).await.unwrap();
        db.mobile_money().insert_pending(&fresh).await.unwrap();

        let stale = db
            .mobile_money()
            .list_stale_pending(now - Duration::minutes(2), 50)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].checkout_request_id, "ws_CO_old");
    }

    #[tokio::test]
    async fn test_list_stale_pending_within_one_second() {
        let (db, product_id) = setup().await;
        let second = Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap();
        let cutoff = second + Duration::milliseconds(500);

        for (checkout, created_at) in [
            ("ws_CO_a", second),
            ("ws_CO_b", second + Duration::milliseconds(250)),
            ("ws_CO_c", second + Duration::milliseconds(750)),
            ("ws_CO_d", second + Duration::seconds(1)),
        ] {
            let txn = pending(&product_id, checkout, created_at);
            db.mobile_money().insert_pending(&txn).await.unwrap();
        }

        let stale = db.mobile_money().list_stale_pending(cutoff, 50).await.unwrap();
        let ids: Vec<_> = stale.iter().map(|t| t.checkout_request_id.as_str()).collect();
        assert_eq!(ids, ["ws_CO_a", "ws_CO_b"]);
    }
}
