//! The payment capability the settlement engine depends on.

use async_trait::async_trait;
use duka_core::GatewayCredentials;

use crate::error::GatewayError;
use crate::types::{PushAcknowledgement, PushStatus, StkPush};

/// A push-payment gateway.
///
/// Credentials are passed on every call; implementations hold no
/// per-organization state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Authenticates and sends a payment prompt to the customer's phone.
    ///
    /// `Ok` means the gateway accepted the request, not that anyone paid.
    async fn initiate_push(
        &self,
        creds: &GatewayCredentials,
        push: &StkPush,
    ) -> Result<PushAcknowledgement, GatewayError>;

    /// Authenticates and asks for the result of an earlier push.
    async fn query_status(
        &self,
        creds: &GatewayCredentials,
        checkout_request_id: &str,
    ) -> Result<PushStatus, GatewayError>;
}
