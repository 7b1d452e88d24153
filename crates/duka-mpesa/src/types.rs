//! # Gateway Types
//!
//! Daraja request/response bodies (exact field casing) and the
//! gateway-neutral types the rest of Duka works with.

use duka_core::Money;
use serde::{Deserialize, Serialize};

use crate::callback::CallbackValue;

/// `TransactionType` for paybill STK pushes.
pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";

/// Daraja limits `AccountReference` to 12 characters.
pub const ACCOUNT_REFERENCE_MAX_CHARS: usize = 12;

/// Daraja limits `TransactionDesc` to 13 characters.
pub const TRANSACTION_DESC_MAX_CHARS: usize = 13;

/// Error code Daraja returns from the status query while the customer has
/// not yet answered the prompt.
pub const QUERY_STILL_PROCESSING_CODE: &str = "500.001.1001";

// =============================================================================
// Gateway-neutral types
// =============================================================================

/// One payment prompt to send to a customer's phone.
#[derive(Debug, Clone)]
pub struct StkPush {
    /// Normalized `2547XXXXXXXX` number.
    pub phone: String,
    pub amount: Money,
    pub account_reference: String,
    pub description: String,
}

/// The gateway accepted the push; these ids come back on the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAcknowledgement {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: String,
}

/// Outcome of a status query.
#[derive(Debug, Clone, PartialEq)]
pub enum PushStatus {
    /// ResultCode 0: the customer paid.
    Succeeded,
    /// Definitive non-zero ResultCode (cancelled, timed out, insufficient funds...).
    Failed { result_code: i64, description: String },
    /// The customer has not answered yet.
    Processing,
}

// =============================================================================
// Daraja wire format
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct StkPushRequest<'a> {
    pub business_short_code: &'a str,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,
    pub amount: i64,
    pub party_a: &'a str,
    pub party_b: &'a str,
    pub phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    pub call_back_url: &'a str,
    pub account_reference: String,
    pub transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StkQueryRequest<'a> {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: &'a str,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StkQueryResponse {
    #[serde(rename = "ResponseCode")]
    pub response_code: CallbackValue,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: String,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<CallbackValue>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
}

/// Body of a Daraja non-2xx response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct DarajaErrorBody {
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Cuts `value` to at most `max` characters.
pub(crate) fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}
