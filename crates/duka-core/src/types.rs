//! # Domain Types
//!
//! Core domain types used throughout Duka.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────────────────┐  │
//! │  │    Product      │   │   SaleRecord    │   │ CombinedSaleRecord   │  │
//! │  │  ─────────────  │   │  ─────────────  │   │  ──────────────────  │  │
//! │  │  quantity >= 0  │──►│  name snapshot  │──►│  cross-method view   │  │
//! │  │  prices (cents) │   │  totals, profit │   │  same transaction    │  │
//! │  │  reorder_level  │   │  method tag     │   │  write-once          │  │
//! │  └─────────────────┘   └────────▲────────┘   └──────────────────────┘  │
//! │                                 │ created on COMPLETED                  │
//! │  ┌──────────────────────────────┴──┐   ┌─────────────────────────────┐ │
//! │  │    MobileMoneyTransaction       │   │    GatewayCredentials       │ │
//! │  │  ─────────────────────────────  │   │  ─────────────────────────  │ │
//! │  │  PENDING → COMPLETED | FAILED   │   │  per organization           │ │
//! │  │  (merchant, checkout) ids       │   │  read-only to settlement    │ │
//! │  └─────────────────────────────────┘   └─────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in an organization's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Organization (tenant) owning this product.
    pub organization_id: String,

    /// Display name, snapshotted into every sale.
    pub name: String,

    /// Category name, snapshotted into every sale.
    pub category: String,

    /// Unit cost in cents.
    pub buying_price_cents: i64,

    /// Unit price in cents.
    pub selling_price_cents: i64,

    /// Authoritative stock count. Never negative.
    pub quantity: i64,

    /// Stock level at or below which a reorder alert fires.
    pub reorder_level: i64,

    /// Soft-delete flag. Inactive products cannot be sold.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the unit buying price as Money.
    #[inline]
    pub fn buying_price(&self) -> Money {
        Money::from_cents(self.buying_price_cents)
    }

    /// Returns the unit selling price as Money.
    #[inline]
    pub fn selling_price(&self) -> Money {
        Money::from_cents(self.selling_price_cents)
    }

    /// Fails with `InsufficientStock` unless the current stock covers
    /// `quantity`.
    pub fn ensure_sellable(&self, quantity: i64) -> CoreResult<()> {
        if self.quantity >= quantity {
            Ok(())
        } else {
            Err(CoreError::InsufficientStock {
                product_id: self.id.clone(),
                available: self.quantity,
                requested: quantity,
            })
        }
    }

    /// True when stock has fallen to the reorder threshold.
    #[inline]
    pub fn needs_reorder(&self) -> bool {
        self.quantity <= self.reorder_level
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a sale was paid. Stored as the ledger's method tag.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    /// Physical cash, settled synchronously.
    Cash,
    /// M-Pesa STK push, settled when the gateway confirms.
    MobileMoney,
}

impl PaymentMethod {
    /// The ledger tag: `"cash"` or `"mobile-money"`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile-money",
        }
    }

    /// Whether stock is taken at request time (cash) or only once an
    /// external confirmation arrives (mobile money).
    pub const fn settles_immediately(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale Records (Ledger)
// =============================================================================

/// Immutable ledger entry for a settled sale.
///
/// ## Snapshot Pattern
/// Product name, category and unit prices are copied at sale time. Renaming
/// or repricing a product later never changes history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SaleRecord {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub unit_buying_price_cents: i64,
    pub unit_selling_price_cents: i64,
    pub quantity: i64,
    pub total_buying_price_cents: i64,
    pub total_selling_price_cents: i64,
    /// `total_selling_price_cents - total_buying_price_cents`
    pub profit_cents: i64,
    pub cash_received_cents: i64,
    /// `cash_received_cents - total_selling_price_cents`; negative on underpayment.
    pub balance_cents: i64,
    pub payment_method: PaymentMethod,
    /// Gateway receipt for mobile money, `None` for cash.
    pub external_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cross-method reporting projection, written with its [`SaleRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CombinedSaleRecord {
    pub id: String,
    pub sale_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub quantity: i64,
    pub total_selling_price_cents: i64,
    pub total_buying_price_cents: i64,
    pub profit_cents: i64,
    pub payment_method: PaymentMethod,
    pub external_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Mobile Money Transaction
// =============================================================================

/// Lifecycle of an in-flight STK push.
///
/// ```text
///   PENDING ──(ResultCode 0, stock ok)──► COMPLETED
///      │
///      └──(ResultCode != 0 | stock gone)──► FAILED
/// ```
/// Both terminal states are final.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

/// A mobile-money payment awaiting (or past) gateway confirmation.
///
/// The `(merchant_request_id, checkout_request_id)` pair is issued by the
/// gateway and is the only key a callback carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MobileMoneyTransaction {
    pub transaction_id: String,
    pub organization_id: String,
    pub user_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    /// Normalized `2547XXXXXXXX` form.
    pub phone: String,
    pub amount_cents: i64,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub status: TransactionStatus,
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MobileMoneyTransaction {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Gateway Credentials
// =============================================================================

/// Complete per-organization gateway configuration.
///
/// Only obtainable through [`StoredGatewayCredentials::complete`], so holding
/// one means every field is present.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
    pub organization_id: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub pass_key: String,
    pub callback_url: String,
}

// Secrets stay out of logs.
impl std::fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("organization_id", &self.organization_id)
            .field("short_code", &self.short_code)
            .field("callback_url", &self.callback_url)
            .finish_non_exhaustive()
    }
}

/// Gateway configuration as stored by the configuration collaborator.
/// Any field may be absent.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StoredGatewayCredentials {
    pub organization_id: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub short_code: Option<String>,
    pub pass_key: Option<String>,
    pub callback_url: Option<String>,
}

impl StoredGatewayCredentials {
    /// Checks every field and returns usable credentials.
    ///
    /// ## Errors
    /// `ConfigurationMissing` naming the first absent/blank field, or the
    /// callback URL when it is not an absolute http(s) URL.
    pub fn complete(self) -> CoreResult<GatewayCredentials> {
        let organization_id = self.organization_id;
        let require = |field: &str, value: Option<String>| -> CoreResult<String> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(CoreError::ConfigurationMissing {
                    organization_id: organization_id.clone(),
                    field: field.to_string(),
                }),
            }
        };

        let consumer_key = require("consumer_key", self.consumer_key)?;
        let consumer_secret = require("consumer_secret", self.consumer_secret)?;
        let short_code = require("short_code", self.short_code)?;
        let pass_key = require("pass_key", self.pass_key)?;
        let callback_url = require("callback_url", self.callback_url)?;

        let parsed = url::Url::parse(&callback_url).ok();
        if !matches!(parsed.as_ref().map(|u| u.scheme()), Some("http" | "https")) {
            return Err(CoreError::ConfigurationMissing {
                organization_id,
                field: "callback_url (absolute http(s) URL)".to_string(),
            });
        }

        Ok(GatewayCredentials {
            organization_id,
            consumer_key,
            consumer_secret,
            short_code,
            pass_key,
            callback_url,
        })
    }
}

// =============================================================================
// Identifier Generation
// =============================================================================

/// Generates a new sale id.
pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a mobile-money transaction id: `<prefix>-<random>-<unixtime>`.
///
/// Unique without coordination: 8 random hex chars plus the second.
///
/// ```rust
/// use chrono::TimeZone;
/// use duka_core::generate_transaction_id;
///
/// let now = chrono::Utc.timestamp_opt(1_700_000_000, 0).unwrap();
/// let id = generate_transaction_id("DK", now);
/// assert!(id.starts_with("DK-"));
/// assert!(id.ends_with("-1700000000"));
/// ```
pub fn generate_transaction_id(prefix: &str, now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        prefix,
        random[..8].to_uppercase(),
        now.timestamp()
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> StoredGatewayCredentials {
        StoredGatewayCredentials {
            organization_id: "org-1".to_string(),
            consumer_key: Some("key".to_string()),
            consumer_secret: Some("secret".to_string()),
            short_code: Some("174379".to_string()),
            pass_key: Some("passkey".to_string()),
            callback_url: Some("https://example.com/mpesa/callback".to_string()),
        }
    }

    #[test]
    fn test_ensure_sellable() {
        let now = Utc::now();
        let product = Product {
            id: "p-1".to_string(),
            organization_id: "org-1".to_string(),
            name: "Widget".to_string(),
            category: "Hardware".to_string(),
            buying_price_cents: 50,
            selling_price_cents: 80,
            quantity: 2,
            reorder_level: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        assert!(product.ensure_sellable(2).is_ok());
        let err = product.ensure_sellable(5).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientStock {
                available: 2,
                requested: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_payment_method_tags() {
        assert_eq!(PaymentMethod::Cash.as_str(), "cash");
        assert_eq!(PaymentMethod::MobileMoney.as_str(), "mobile-money");
        assert_eq!(
            serde_json::to_string(&PaymentMethod::MobileMoney).unwrap(),
            "\"mobile-money\""
        );
        assert!(PaymentMethod::Cash.settles_immediately());
        assert!(!PaymentMethod::MobileMoney.settles_immediately());
    }

    #[test]
    fn test_transaction_status_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_complete_credentials() {
        let creds = stored().complete().unwrap();
        assert_eq!(creds.short_code, "174379");

        let debug = format!("{:?}", creds);
        assert!(!debug.contains("secret"));
        assert!(!debug.contains("passkey"));
    }

    #[test]
    fn test_missing_credential_field_is_named() {
        let mut partial = stored();
        partial.pass_key = Some("   ".to_string());

        match partial.complete() {
            Err(CoreError::ConfigurationMissing { field, .. }) => assert_eq!(field, "pass_key"),
            other => panic!("expected ConfigurationMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_relative_callback_url_rejected() {
        let mut partial = stored();
        partial.callback_url = Some("/mpesa/callback".to_string());
        assert!(matches!(
            partial.complete(),
            Err(CoreError::ConfigurationMissing { .. })
        ));
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        let now = Utc::now();
        let a = generate_transaction_id("DK", now);
        let b = generate_transaction_id("DK", now);
        assert_ne!(a, b);
        assert_eq!(a.split('-').count(), 3);
    }
}
