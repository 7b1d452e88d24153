//! # Settlement Engine
//!
//! Turns a sale request into stock movement and ledger entries.
//!
//! ## Flows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cash                                                                   │
//! │    validate ──► settle_sale (one transaction) ──► reorder alert         │
//! │                                                                         │
//! │  Mobile money (initiation)                                              │
//! │    validate ──► active product? ──► enough stock? ──► credentials       │
//! │        ──► STK push ──► insert PENDING ──► return                       │
//! │                                                                         │
//! │    Stock is NOT taken here. The callback reconciler settles the sale    │
//! │    when the gateway confirms payment.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use duka_core::validation::{
    normalize_phone, validate_cash_received, validate_quantity, validate_required,
};
use duka_core::{
    generate_transaction_id, MobileMoneyTransaction, Money, PaymentMethod, SalePricing,
    StoredGatewayCredentials, TransactionStatus,
};
use duka_db::{Database, DbError, SaleRequest, StockOutcome};
use duka_mpesa::{PaymentGateway, StkPush};

use crate::error::SettlementError;
use crate::services::notifier::{dispatch_reorder, ReorderNotifier};

// =============================================================================
// Requests and Results
// =============================================================================

/// `POST /cash/sell` body. Amounts are in cents.
#[derive(Debug, Clone, Deserialize)]
pub struct CashSaleRequest {
    pub organization_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    pub user_id: String,
    pub cash_received: i64,
}

/// Outcome of a settled cash sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashReceipt {
    pub sale_id: String,
    /// Change owed; negative when underpaid.
    pub balance: i64,
    pub product_id: String,
    pub quantity_sold: i64,
    pub remaining_qty: i64,
    pub total_cost: i64,
    pub total_selling_price: i64,
    pub profit: i64,
}

/// `POST /sell-product` body.
#[derive(Debug, Clone, Deserialize)]
pub struct MobileMoneySaleRequest {
    pub organization_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    pub user_id: String,
    pub phone: String,
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Outcome of an accepted STK push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobileMoneyInitiation {
    pub message: String,
    pub transaction_id: String,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    /// Stock on hand; unchanged until the payment is confirmed.
    pub remaining_qty: i64,
    /// Amount the customer is prompted for, in cents.
    pub total_cost: i64,
}

// =============================================================================
// Engine
// =============================================================================

/// Settles sales for every payment method.
#[derive(Clone)]
pub struct SettlementEngine {
    db: Database,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn ReorderNotifier>,
    transaction_prefix: String,
}

impl SettlementEngine {
    pub fn new(
        db: Database,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn ReorderNotifier>,
        transaction_prefix: impl Into<String>,
    ) -> Self {
        SettlementEngine {
            db,
            gateway,
            notifier,
            transaction_prefix: transaction_prefix.into(),
        }
    }

    /// Settles a cash sale: stock and ledger change together or not at all.
    pub async fn sell_cash(&self, request: CashSaleRequest) -> Result<CashReceipt, SettlementError> {
        validate_required("organization_id", &request.organization_id)?;
        validate_required("product_id", &request.product_id)?;
        validate_required("user_id", &request.user_id)?;
        validate_quantity(request.quantity_sold)?;
        validate_cash_received(request.cash_received)?;

        let sale = SaleRequest {
            organization_id: request.organization_id.trim().to_string(),
            product_id: request.product_id.trim().to_string(),
            user_id: request.user_id.trim().to_string(),
            quantity: request.quantity_sold,
            pricing: SalePricing::Counter {
                cash_received: Money::from_cents(request.cash_received),
            },
            payment_method: PaymentMethod::Cash,
            external_transaction_id: None,
        };

        debug!(
            product_id = %sale.product_id,
            quantity = sale.quantity,
            "Settling cash sale"
        );

        let settled = match self.db.settlement().settle_sale(&sale).await? {
            StockOutcome::Settled(settled) => settled,
            StockOutcome::ProductUnavailable => {
                return Err(SettlementError::NotFound(format!(
                    "Product not found: {}",
                    sale.product_id
                )));
            }
            StockOutcome::InsufficientStock { available } => {
                info!(
                    product_id = %sale.product_id,
                    available,
                    requested = sale.quantity,
                    "Cash sale refused: insufficient stock"
                );
                return Err(SettlementError::InsufficientStock {
                    product_id: sale.product_id,
                    available,
                    requested: sale.quantity,
                });
            }
        };

        dispatch_reorder(&self.notifier, &settled.product);

        let record = &settled.sale;
        Ok(CashReceipt {
            sale_id: record.id.clone(),
            balance: record.balance_cents,
            product_id: record.product_id.clone(),
            quantity_sold: record.quantity,
            remaining_qty: settled.remaining_quantity(),
            total_cost: record.total_buying_price_cents,
            total_selling_price: record.total_selling_price_cents,
            profit: record.profit_cents,
        })
    }

    /// Sends an STK push for the sale and records it as PENDING.
    ///
    /// Nothing is persisted unless the gateway accepted the push.
    pub async fn initiate_mobile_money(
        &self,
        request: MobileMoneySaleRequest,
    ) -> Result<MobileMoneyInitiation, SettlementError> {
        validate_required("organization_id", &request.organization_id)?;
        validate_required("product_id", &request.product_id)?;
        validate_required("user_id", &request.user_id)?;
        validate_quantity(request.quantity_sold)?;
        let phone = normalize_phone(&request.phone)?;
        if let Some(id) = &request.transaction_id {
            validate_required("transaction_id", id)?;
        }

        let organization_id = request.organization_id.trim();
        let product_id = request.product_id.trim();
        let quantity = request.quantity_sold;

        let product = self
            .db
            .products()
            .get_active(organization_id, product_id)
            .await?
            .ok_or_else(|| SettlementError::NotFound(format!("Product not found: {}", product_id)))?;

        product.ensure_sellable(quantity)?;

        let now = Utc::now();
        let transaction_id = match request.transaction_id {
            Some(id) => {
                let id = id.trim().to_string();
                if self.db.mobile_money().get(&id).await?.is_some() {
                    return Err(SettlementError::InvalidInput(format!(
                        "transaction_id '{}' already exists",
                        id
                    )));
                }
                id
            }
            None => generate_transaction_id(&self.transaction_prefix, now),
        };

        let creds = self
            .db
            .credentials()
            .get(organization_id)
            .await?
            .unwrap_or_else(|| StoredGatewayCredentials {
                organization_id: organization_id.to_string(),
                ..Default::default()
            })
            .complete()?;

        let amount = product.selling_price().multiply_quantity(quantity);
        let push = StkPush {
            phone: phone.clone(),
            amount,
            account_reference: product.name.clone(),
            description: format!("Payment for {} items", quantity),
        };

        let ack = self
            .gateway
            .initiate_push(&creds, &push)
            .await
            .map_err(|e| {
                warn!(
                    organization_id = %organization_id,
                    transaction_id = %transaction_id,
                    error = %e,
                    "STK push failed"
                );
                SettlementError::GatewayError(e)
            })?;

        let txn = MobileMoneyTransaction {
            transaction_id: transaction_id.clone(),
            organization_id: organization_id.to_string(),
            user_id: request.user_id.trim().to_string(),
            product_id: product.id.clone(),
            quantity_sold: quantity,
            phone,
            amount_cents: amount.cents(),
            merchant_request_id: ack.merchant_request_id.clone(),
            checkout_request_id: ack.checkout_request_id.clone(),
            status: TransactionStatus::Pending,
            receipt: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.db.mobile_money().insert_pending(&txn).await {
            error!(
                reconciliation_hazard = true,
                transaction_id = %txn.transaction_id,
                merchant_request_id = %txn.merchant_request_id,
                checkout_request_id = %txn.checkout_request_id,
                organization_id = %txn.organization_id,
                product_id = %txn.product_id,
                quantity = txn.quantity_sold,
                phone = %txn.phone,
                amount_cents = txn.amount_cents,
                error = %e,
                "STK push sent but transaction could not be recorded"
            );
            // The push went out; never report this as a client error.
            return Err(SettlementError::PersistenceError(DbError::Internal(format!(
                "transaction {} not recorded: {}",
                txn.transaction_id, e
            ))));
        }

        info!(
            transaction_id = %txn.transaction_id,
            checkout_request_id = %txn.checkout_request_id,
            product_id = %txn.product_id,
            amount = %txn.amount(),
            "STK push initiated"
        );

        let message = if ack.customer_message.trim().is_empty() {
            "Payment request sent to customer".to_string()
        } else {
            ack.customer_message
        };

        Ok(MobileMoneyInitiation {
            message,
            transaction_id: txn.transaction_id,
            merchant_request_id: txn.merchant_request_id,
            checkout_request_id: txn.checkout_request_id,
            product_id: txn.product_id,
            quantity_sold: quantity,
            remaining_qty: product.quantity,
            total_cost: txn.amount_cents,
        })
    }
}
