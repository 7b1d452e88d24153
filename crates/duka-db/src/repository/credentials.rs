//! # Gateway Credentials Repository
//!
//! Per-organization M-Pesa configuration. Organization settings own the
//! table; settlement only reads it. Completeness is checked by
//! `StoredGatewayCredentials::complete`, not here.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use duka_core::StoredGatewayCredentials;

/// Repository for gateway credentials.
#[derive(Debug, Clone)]
pub struct CredentialsRepository {
    pool: SqlitePool,
}

impl CredentialsRepository {
    /// Creates a new CredentialsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CredentialsRepository { pool }
    }

    /// Gets an organization's stored credentials, complete or not.
    pub async fn get(&self, organization_id: &str) -> DbResult<Option<StoredGatewayCredentials>> {
        let creds = sqlx::query_as::<_, StoredGatewayCredentials>(
            r#"
            SELECT organization_id, consumer_key, consumer_secret,
                   short_code, pass_key, callback_url
            FROM gateway_credentials
            WHERE organization_id = ?1
            "#,
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(creds)
    }

    /// Inserts or replaces an organization's credentials.
    pub async fn upsert(&self, creds: &StoredGatewayCredentials) -> DbResult<()> {
        debug!(organization_id = %creds.organization_id, "Saving gateway credentials");

        sqlx::query(
            r#"
            INSERT INTO gateway_credentials (
                organization_id, consumer_key, consumer_secret,
                short_code, pass_key, callback_url, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(organization_id) DO UPDATE SET
                consumer_key = excluded.consumer_key,
                consumer_secret = excluded.consumer_secret,
                short_code = excluded.short_code,
                pass_key = excluded.pass_key,
                callback_url = excluded.callback_url,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&creds.organization_id)
        .bind(&creds.consumer_key)
        .bind(&creds.consumer_secret)
        .bind(&creds.short_code)
        .bind(&creds.pass_key)
        .bind(&creds.callback_url)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
