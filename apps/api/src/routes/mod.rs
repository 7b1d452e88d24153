//! # HTTP Routes
//!
//! ```text
//! POST /cash/sell                                  ──► sales::sell_cash
//! POST /sell-product                               ──► sales::sell_product
//! POST /mpesa/callback                             ──► mpesa::callback
//! GET  /sales/{sale_id}                            ──► sales::get_sale
//! GET  /mobile-money/transactions/{transaction_id} ──► mpesa::get_transaction
//! GET  /health                                     ──► health
//! ```

pub mod mpesa;
pub mod sales;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cash/sell", post(sales::sell_cash))
        .route("/sell-product", post(sales::sell_product))
        .route("/mpesa/callback", post(mpesa::callback))
        .route("/sales/{sale_id}", get(sales::get_sale))
        .route(
            "/mobile-money/transactions/{transaction_id}",
            get(mpesa::get_transaction),
        )
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if state.db.health_check().await {
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok".to_string(),
                database: "connected".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "degraded".to_string(),
                database: "unavailable".to_string(),
            }),
        )
    }
}
