//! # Daraja Client
//!
//! HTTP client for the M-Pesa Daraja API.
//!
//! ## Request Flow
//! ```text
//! ┌──────────────┐  GET /oauth/v1/generate              ┌──────────────┐
//! │              │  Authorization: Basic key:secret     │              │
//! │ DarajaClient │ ───────────────────────────────────► │    Daraja    │
//! │              │ ◄─── {access_token} ──────────────── │              │
//! │              │                                      │              │
//! │              │  POST /mpesa/stkpush/v1/processrequest              │
//! │              │  Authorization: Bearer <token>       │              │
//! │              │ ───────────────────────────────────► │              │
//! │              │ ◄─── {MerchantRequestID,             │              │
//! │              │       CheckoutRequestID,             │              │
//! │              │       ResponseCode} ──────────────── │              │
//! └──────────────┘                                      └──────────────┘
//! ```
//!
//! Every call has an explicit timeout and none is retried; a token is
//! requested per operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duka_core::GatewayCredentials;
use reqwest::Client;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::gateway::PaymentGateway;
use crate::password::{stk_password, stk_timestamp};
use crate::types::{
    truncate_chars, DarajaErrorBody, PushAcknowledgement, PushStatus, StkPush, StkPushRequest,
    StkPushResponse, StkQueryRequest, StkQueryResponse, TokenResponse,
    ACCOUNT_REFERENCE_MAX_CHARS, QUERY_STILL_PROCESSING_CODE, TRANSACTION_DESC_MAX_CHARS,
    TRANSACTION_TYPE_PAYBILL,
};

const TOKEN_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

// =============================================================================
// Configuration
// =============================================================================

/// Which Daraja deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpesaEnvironment {
    Sandbox,
    Production,
}

impl MpesaEnvironment {
    pub fn base_url(&self) -> &'static str {
        match self {
            MpesaEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            MpesaEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

impl FromStr for MpesaEnvironment {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(MpesaEnvironment::Sandbox),
            "production" | "live" => Ok(MpesaEnvironment::Production),
            other => Err(GatewayError::ConfigError(format!(
                "unknown M-Pesa environment '{}'",
                other
            ))),
        }
    }
}

/// Configuration for the Daraja client. Credentials are not part of it;
/// they are supplied per call.
#[derive(Debug, Clone)]
pub struct DarajaConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl DarajaConfig {
    pub fn new(environment: MpesaEnvironment) -> Self {
        DarajaConfig {
            base_url: environment.base_url().to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Points the client somewhere else (proxy, local stand-in).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Client
// =============================================================================

/// Daraja API client.
#[derive(Clone)]
pub struct DarajaClient {
    config: Arc<DarajaConfig>,
    http_client: Client,
}

impl DarajaClient {
    /// Create a new client with the given configuration
    pub fn new(config: DarajaConfig) -> Result<Self, GatewayError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::HttpError(e.to_string()))?;

        Ok(DarajaClient {
            config: Arc::new(config),
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /// Requests an OAuth access token.
    pub async fn access_token(&self, creds: &GatewayCredentials) -> Result<String, GatewayError> {
        debug!(organization_id = %creds.organization_id, "Requesting gateway access token");

        let response = self
            .http_client
            .get(self.url(TOKEN_PATH))
            .basic_auth(&creds.consumer_key, Some(&creds.consumer_secret))
            .send()
            .await?;

        let token: TokenResponse = self.handle_response(response).await?;
        if token.access_token.trim().is_empty() {
            return Err(GatewayError::ParseError("empty access_token".to_string()));
        }
        Ok(token.access_token)
    }

    /// Sends an STK push prompt.
    pub async fn stk_push(
        &self,
        creds: &GatewayCredentials,
        token: &str,
        push: &StkPush,
        now: DateTime<Utc>,
    ) -> Result<PushAcknowledgement, GatewayError> {
        let timestamp = stk_timestamp(now);
        let body = StkPushRequest {
            business_short_code: &creds.short_code,
            password: stk_password(&creds.short_code, &creds.pass_key, &timestamp),
            timestamp,
            transaction_type: TRANSACTION_TYPE_PAYBILL,
            amount: push.amount.whole_units_ceil(),
            party_a: &push.phone,
            party_b: &creds.short_code,
            phone_number: &push.phone,
            call_back_url: &creds.callback_url,
            account_reference: truncate_chars(&push.account_reference, ACCOUNT_REFERENCE_MAX_CHARS),
            transaction_desc: truncate_chars(&push.description, TRANSACTION_DESC_MAX_CHARS),
        };

        debug!(
            organization_id = %creds.organization_id,
            amount = body.amount,
            "Sending STK push"
        );

        let response = self
            .http_client
            .post(self.url(STK_PUSH_PATH))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let ack: StkPushResponse = self.handle_response(response).await?;

        if ack.response_code.trim() != "0" {
            warn!(
                code = %ack.response_code,
                description = %ack.response_description,
                "STK push rejected"
            );
            return Err(GatewayError::Rejected {
                code: ack.response_code,
                description: ack.response_description,
            });
        }

        Ok(PushAcknowledgement {
            merchant_request_id: ack.merchant_request_id,
            checkout_request_id: ack.checkout_request_id,
            customer_message: ack.customer_message,
        })
    }

    /// Asks the gateway for the result of an earlier push.
    pub async fn stk_query(
        &self,
        creds: &GatewayCredentials,
        token: &str,
        checkout_request_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PushStatus, GatewayError> {
        let timestamp = stk_timestamp(now);
        let body = StkQueryRequest {
            business_short_code: &creds.short_code,
            password: stk_password(&creds.short_code, &creds.pass_key, &timestamp),
            timestamp,
            checkout_request_id,
        };

        let response = self
            .http_client
            .post(self.url(STK_QUERY_PATH))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            let error: DarajaErrorBody = serde_json::from_str(&raw).unwrap_or_default();
            if error.error_code.as_deref() == Some(QUERY_STILL_PROCESSING_CODE) {
                return Ok(PushStatus::Processing);
            }
            return Err(GatewayError::ApiError {
                status_code: status.as_u16(),
                message: error.error_message.unwrap_or(raw),
            });
        }

        let result: StkQueryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ParseError(e.to_string()))?;

        if result.response_code.as_i64() != Some(0) {
            return Err(GatewayError::Rejected {
                code: result.response_code.as_text(),
                description: result.response_description,
            });
        }

        match result.result_code.as_ref().and_then(|c| c.as_i64()) {
            Some(0) => Ok(PushStatus::Succeeded),
            Some(code) => Ok(PushStatus::Failed {
                result_code: code,
                description: result.result_desc,
            }),
            None => Ok(PushStatus::Processing),
        }
    }

    /// Handle HTTP response and convert to appropriate type or error
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::ParseError(e.to_string()))
        } else {
            let raw = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            let message = serde_json::from_str::<DarajaErrorBody>(&raw)
                .ok()
                .and_then(|body| body.error_message)
                .unwrap_or(raw);

            Err(GatewayError::ApiError {
                status_code: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn initiate_push(
        &self,
        creds: &GatewayCredentials,
        push: &StkPush,
    ) -> Result<PushAcknowledgement, GatewayError> {
        let token = self.access_token(creds).await?;
        self.stk_push(creds, &token, push, Utc::now()).await
    }

    async fn query_status(
        &self,
        creds: &GatewayCredentials,
        checkout_request_id: &str,
    ) -> Result<PushStatus, GatewayError> {
        let token = self.access_token(creds).await?;
        self.stk_query(creds, &token, checkout_request_id, Utc::now()).await
    }
}
