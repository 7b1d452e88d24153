//! # M-Pesa Routes
//!
//! The callback endpoint answers 200 no matter what happened: the gateway
//! retries on anything else, and every outcome here is already final or
//! logged.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use duka_core::TransactionStatus;

use crate::error::{ApiError, SettlementError};
use crate::services::ReconcileOutcome;
use crate::AppState;

/// Body of every callback response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAck {
    pub message: String,
}

/// `GET /mobile-money/transactions/{transaction_id}` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction_id: String,
    pub status: TransactionStatus,
    pub product_id: String,
    pub quantity_sold: i64,
    pub amount: i64,
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub receipt: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `POST /mpesa/callback`
pub async fn callback(State(state): State<AppState>, body: Bytes) -> Json<CallbackAck> {
    let message = match state.reconciler.handle_callback(&body).await {
        Ok(ReconcileOutcome::Completed {
            transaction_id,
            sale_id,
        }) => {
            info!(transaction_id = %transaction_id, sale_id = %sale_id, "Callback settled sale");
            "Payment received, sale recorded".to_string()
        }
        Ok(ReconcileOutcome::Failed { reason, .. }) => format!("Payment failed: {}", reason),
        Err(SettlementError::DuplicateCallback(_)) => "Callback already processed".to_string(),
        Err(SettlementError::NotFound(_)) => "Callback acknowledged, no matching transaction".to_string(),
        Err(SettlementError::InvalidInput(_)) => "Callback acknowledged, payload not understood".to_string(),
        Err(e) => {
            error!(error = %e, "Callback processing failed");
            "Callback acknowledged".to_string()
        }
    };

    Json(CallbackAck { message })
}

/// `GET /mobile-money/transactions/{transaction_id}`
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let txn = state
        .db
        .mobile_money()
        .get(&transaction_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Mobile money transaction", &transaction_id))?;

    Ok(Json(TransactionView {
        transaction_id: txn.transaction_id,
        status: txn.status,
        product_id: txn.product_id,
        quantity_sold: txn.quantity_sold,
        amount: txn.amount_cents,
        merchant_request_id: txn.merchant_request_id,
        checkout_request_id: txn.checkout_request_id,
        receipt: txn.receipt,
        failure_reason: txn.failure_reason,
        created_at: txn.created_at,
        updated_at: txn.updated_at,
    }))
}
