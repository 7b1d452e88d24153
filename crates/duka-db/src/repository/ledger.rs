//! # Ledger Repository
//!
//! The write-once sale ledger: one `sales` row and one `combined_sales` row
//! per settled sale, always written together inside the settling
//! transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use duka_core::{CombinedSaleRecord, SaleDraft, SaleRecord};

const SALE_COLUMNS: &str = r#"
    id, organization_id, user_id, product_id, product_name, category,
    unit_buying_price_cents, unit_selling_price_cents, quantity,
    total_buying_price_cents, total_selling_price_cents, profit_cents,
    cash_received_cents, balance_cents, payment_method,
    external_transaction_id, created_at
"#;

const COMBINED_COLUMNS: &str = r#"
    id, sale_id, organization_id, user_id, product_id, product_name, category,
    quantity, total_selling_price_cents, total_buying_price_cents, profit_cents,
    payment_method, external_transaction_id, created_at
"#;

/// Repository for ledger reads.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Gets a sale by ID.
    pub async fn get_sale(&self, sale_id: &str) -> DbResult<Option<SaleRecord>> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);

        let sale = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(sale)
    }

    /// Gets the combined projection written with a sale.
    pub async fn get_combined(&self, sale_id: &str) -> DbResult<Option<CombinedSaleRecord>> {
        let sql = format!(
            "SELECT {} FROM combined_sales WHERE sale_id = ?1",
            COMBINED_COLUMNS
        );

        let record = sqlx::query_as::<_, CombinedSaleRecord>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Sales settled against an external (gateway) transaction id.
    pub async fn find_by_external_id(&self, external_id: &str) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "SELECT {} FROM sales WHERE external_transaction_id = ?1 ORDER BY created_at",
            SALE_COLUMNS
        );

        let sales = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(external_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    /// Counts `(sales, combined_sales)` rows for an organization.
    pub async fn count_for_organization(&self, organization_id: &str) -> DbResult<(i64, i64)> {
        let sales: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE organization_id = ?1")
                .bind(organization_id)
                .fetch_one(&self.pool)
                .await?;

        let combined: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM combined_sales WHERE organization_id = ?1")
                .bind(organization_id)
                .fetch_one(&self.pool)
                .await?;

        Ok((sales, combined))
    }
}

// =============================================================================
// Ledger Writer
// =============================================================================

/// Writes the ledger pair for `draft` on the caller's transaction.
///
/// Neither row is visible unless the caller commits; a failure on the
/// second insert leaves nothing behind once the transaction is dropped.
pub async fn insert_pair(conn: &mut SqliteConnection, draft: &SaleDraft) -> DbResult<SaleRecord> {
    let sale = draft.sale_record();
    let combined = draft.combined_record();

    debug!(
        sale_id = %sale.id,
        product_id = %sale.product_id,
        payment_method = %sale.payment_method,
        "Writing ledger pair"
    );

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, organization_id, user_id, product_id, product_name, category,
            unit_buying_price_cents, unit_selling_price_cents, quantity,
            total_buying_price_cents, total_selling_price_cents, profit_cents,
            cash_received_cents, balance_cents, payment_method,
            external_transaction_id, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9,
            ?10, ?11, ?12,
            ?13, ?14, ?15,
            ?16, ?17
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.organization_id)
    .bind(&sale.user_id)
    .bind(&sale.product_id)
    .bind(&sale.product_name)
    .bind(&sale.category)
    .bind(sale.unit_buying_price_cents)
    .bind(sale.unit_selling_price_cents)
    .bind(sale.quantity)
    .bind(sale.total_buying_price_cents)
    .bind(sale.total_selling_price_cents)
    .bind(sale.profit_cents)
    .bind(sale.cash_received_cents)
    .bind(sale.balance_cents)
    .bind(sale.payment_method)
    .bind(&sale.external_transaction_id)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO combined_sales (
            id, sale_id, organization_id, user_id, product_id, product_name, category,
            quantity, total_selling_price_cents, total_buying_price_cents, profit_cents,
            payment_method, external_transaction_id, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11,
            ?12, ?13, ?14
        )
        "#,
    )
    .bind(&combined.id)
    .bind(&combined.sale_id)
    .bind(&combined.organization_id)
    .bind(&combined.user_id)
    .bind(&combined.product_id)
    .bind(&combined.product_name)
    .bind(&combined.category)
    .bind(combined.quantity)
    .bind(combined.total_selling_price_cents)
    .bind(combined.total_buying_price_cents)
    .bind(combined.profit_cents)
    .bind(combined.payment_method)
    .bind(&combined.external_transaction_id)
    .bind(combined.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(sale)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::product::generate_product_id;
    use crate::{Database, DbConfig, DbError};
    use chrono::Utc;
    use duka_core::{Money, PaymentMethod, Product, SalePricing};

    async fn setup() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_product_id(),
            organization_id: "org-1".to_string(),
            name: "Sugar 1kg".to_string(),
            category: "Grocery".to_string(),
            buying_price_cents: 50,
            selling_price_cents: 80,
            quantity: 10,
            reorder_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap();
        (db, product)
    }

    #[tokio::test]
    async fn test_insert_pair_and_read_back() {
        let (db, product) = setup().await;
        let draft = SaleDraft::from_product(
            &product,
            "cashier-1",
            3,
            SalePricing::Counter {
                cash_received: Money::from_cents(300),
            },
            PaymentMethod::Cash,
            None,
            Utc::now(),
        );

        let mut tx = db.pool().begin().await.unwrap();
        let sale = insert_pair(&mut tx, &draft).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.ledger().get_sale(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored, sale);
        assert_eq!(stored.payment_method, PaymentMethod::Cash);
        assert_eq!(stored.balance_cents, 60);

        let combined = db.ledger().get_combined(&sale.id).await.unwrap().unwrap();
        assert_eq!(combined.profit_cents, 90);
        assert_eq!(db.ledger().count_for_organization("org-1").await.unwrap(), (1, 1));
    }

    #[tokio::test]
    async fn test_pair_is_written_once() {
        let (db, product) = setup().await;
        let draft = SaleDraft::from_product(
            &product,
            "cashier-1",
            1,
            SalePricing::Agreed {
                total_selling: Money::from_cents(80),
                paid: Money::from_cents(80),
            },
            PaymentMethod::MobileMoney,
            Some("QK1".to_string()),
            Utc::now(),
        );

        let mut tx = db.pool().begin().await.unwrap();
        insert_pair(&mut tx, &draft).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let err = insert_pair(&mut tx, &draft).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
        drop(tx);

        assert_eq!(db.ledger().find_by_external_id("QK1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_pair_is_invisible() {
        let (db, product) = setup().await;
        let draft = SaleDraft::from_product(
            &product,
            "cashier-1",
            1,
            SalePricing::Counter {
                cash_received: Money::from_cents(80),
            },
            PaymentMethod::Cash,
            None,
            Utc::now(),
        );

        let mut tx = db.pool().begin().await.unwrap();
        insert_pair(&mut tx, &draft).await.unwrap();
        tx.rollback().await.unwrap();

        assert!(db.ledger().get_sale(&draft.sale_id).await.unwrap().is_none());
        assert_eq!(db.ledger().count_for_organization("org-1").await.unwrap(), (0, 0));
    }
}
