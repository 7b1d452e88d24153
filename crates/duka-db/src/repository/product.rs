//! # Product Repository
//!
//! Catalog reads and the conditional stock decrement.
//!
//! ## Conditional Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products                                                    │
//! │     SET quantity = quantity - N                                     │
//! │   WHERE id = ? AND organization_id = ? AND is_active = 1            │
//! │     AND quantity >= N                                               │
//! │                                                                     │
//! │  rows_affected = 1  → stock taken                                   │
//! │  rows_affected = 0  → not found, inactive, or not enough stock      │
//! │                                                                     │
//! │  Two sells of 6 against 10: the second UPDATE sees 4 >= 6 false.    │
//! │  There is no read-then-write window to race through.               │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use duka_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, organization_id, name, category,
    buying_price_cents, selling_price_cents,
    quantity, reorder_level, is_active,
    created_at, updated_at
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets an active product scoped to its organization.
    ///
    /// Products of other organizations and soft-deleted products are
    /// reported as absent.
    pub async fn get_active(
        &self,
        organization_id: &str,
        product_id: &str,
    ) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_active(&mut conn, organization_id, product_id).await
    }

    /// Gets a product by ID regardless of organization or active flag.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Inserts a new product.
    pub async fn insert(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, organization_id, name, category,
                buying_price_cents, selling_price_cents,
                quantity, reorder_level, is_active,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.organization_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.buying_price_cents)
        .bind(product.selling_price_cents)
        .bind(product.quantity)
        .bind(product.reorder_level)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical sales keep referencing it; it can no longer be sold.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Counts an organization's active products.
    pub async fn count(&self, organization_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE organization_id = ?1 AND is_active = 1",
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Reads an active, organization-scoped product on the given connection.
pub async fn fetch_active(
    conn: &mut SqliteConnection,
    organization_id: &str,
    product_id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE id = ?1 AND organization_id = ?2 AND is_active = 1",
        PRODUCT_COLUMNS
    );

    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(product_id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(product)
}

/// Takes `quantity` units if and only if enough stock remains.
///
/// Returns `true` when the row was updated.
pub async fn decrement_stock(
    conn: &mut SqliteConnection,
    organization_id: &str,
    product_id: &str,
    quantity: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(product_id = %product_id, quantity, "Conditional stock decrement");

    let result = sqlx::query(
        r#"
        UPDATE products
        SET quantity = quantity - ?3,
            updated_at = ?4
        WHERE id = ?1
          AND organization_id = ?2
          AND is_active = 1
          AND quantity >= ?3
        "#,
    )
    .bind(product_id)
    .bind(organization_id)
    .bind(quantity)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
