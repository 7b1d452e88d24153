//! # duka-mpesa: M-Pesa Gateway for Duka
//!
//! Client for Safaricom's Daraja API (STK push "Lipa na M-Pesa Online")
//! and the model of its result callback.
//!
//! ## Modules
//!
//! - [`gateway`] - `PaymentGateway` trait used by the settlement engine
//! - [`client`] - `DarajaClient`, the reqwest implementation
//! - [`callback`] - callback envelope with safe metadata lookups
//! - [`password`] - STK password and timestamp
//! - [`types`] - wire bodies and gateway-neutral results
//! - [`error`] - `GatewayError`

pub mod callback;
pub mod client;
pub mod error;
pub mod gateway;
pub mod password;
pub mod types;

pub use callback::{CallbackValue, StkCallback};
pub use client::{DarajaClient, DarajaConfig, MpesaEnvironment};
pub use error::GatewayError;
pub use gateway::PaymentGateway;
pub use types::{PushAcknowledgement, PushStatus, StkPush};
