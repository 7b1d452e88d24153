//! # Sale Routes

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use tracing::debug;

use duka_core::SaleRecord;

use crate::error::ApiError;
use crate::services::{CashReceipt, CashSaleRequest, MobileMoneyInitiation, MobileMoneySaleRequest};
use crate::AppState;

/// `POST /cash/sell`
pub async fn sell_cash(
    State(state): State<AppState>,
    payload: Result<Json<CashSaleRequest>, JsonRejection>,
) -> Result<Json<CashReceipt>, ApiError> {
    let Json(request) = payload?;
    debug!(product_id = %request.product_id, "sell_cash request");

    let receipt = state.engine.sell_cash(request).await?;
    Ok(Json(receipt))
}

/// `POST /sell-product`
pub async fn sell_product(
    State(state): State<AppState>,
    payload: Result<Json<MobileMoneySaleRequest>, JsonRejection>,
) -> Result<Json<MobileMoneyInitiation>, ApiError> {
    let Json(request) = payload?;
    debug!(product_id = %request.product_id, "sell_product request");

    let initiation = state.engine.initiate_mobile_money(request).await?;
    Ok(Json(initiation))
}

/// `GET /sales/{sale_id}`
pub async fn get_sale(
    State(state): State<AppState>,
    Path(sale_id): Path<String>,
) -> Result<Json<SaleRecord>, ApiError> {
    state
        .db
        .ledger()
        .get_sale(&sale_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Sale", &sale_id))
}
