//! # STK Callback Envelope
//!
//! The gateway's asynchronous result notification.
//!
//! ```text
//! {"Body": {"stkCallback": {
//!     "MerchantRequestID": "29115-34620561-1",
//!     "CheckoutRequestID": "ws_CO_191220191020363925",
//!     "ResultCode": 0,
//!     "ResultDesc": "The service request is processed successfully.",
//!     "CallbackMetadata": {"Item": [
//!         {"Name": "Amount", "Value": 240},
//!         {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
//!         {"Name": "Balance"},
//!         {"Name": "TransactionDate", "Value": 20191219102115},
//!         {"Name": "PhoneNumber", "Value": 254712345678}
//!     ]}
//! }}}
//! ```
//!
//! Item values may be numbers or strings, and may be missing entirely, so
//! every lookup returns an `Option`.

use duka_core::money::MINOR_UNITS_PER_MAJOR;
use serde::Deserialize;

use crate::error::GatewayError;

/// A metadata value: number or string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CallbackValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CallbackValue {
    /// The value as an integer, parsing strings.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CallbackValue::Integer(n) => Some(*n),
            CallbackValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            CallbackValue::Float(_) => None,
            CallbackValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// The value read as whole currency units and converted to cents.
    pub fn as_cents(&self) -> Option<i64> {
        match self {
            CallbackValue::Integer(n) => n.checked_mul(MINOR_UNITS_PER_MAJOR),
            CallbackValue::Float(f) => float_to_cents(*f),
            CallbackValue::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(n) => n.checked_mul(MINOR_UNITS_PER_MAJOR),
                    Err(_) => s.parse::<f64>().ok().and_then(float_to_cents),
                }
            }
        }
    }

    /// The value rendered as text (receipts can arrive as numbers).
    pub fn as_text(&self) -> String {
        match self {
            CallbackValue::Integer(n) => n.to_string(),
            CallbackValue::Float(f) => f.to_string(),
            CallbackValue::Text(s) => s.clone(),
        }
    }
}

fn float_to_cents(units: f64) -> Option<i64> {
    let cents = (units * MINOR_UNITS_PER_MAJOR as f64).round();
    if cents.is_finite() && cents.abs() < i64::MAX as f64 {
        Some(cents as i64)
    } else {
        None
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<CallbackValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

/// The `stkCallback` object.
#[derive(Debug, Clone, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: CallbackValue,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: String,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body")]
    body: CallbackBody,
}

impl StkCallback {
    /// Parses a raw callback body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, GatewayError> {
        serde_json::from_slice::<CallbackEnvelope>(bytes)
            .map(|envelope| envelope.body.stk_callback)
            .map_err(|e| GatewayError::ParseError(e.to_string()))
    }

    /// The numeric result code, if it is one.
    pub fn result_code(&self) -> Option<i64> {
        self.result_code.as_i64()
    }

    pub fn is_success(&self) -> bool {
        self.result_code() == Some(0)
    }

    /// Looks up a metadata item's value by name.
    pub fn item(&self, name: &str) -> Option<&CallbackValue> {
        self.callback_metadata
            .as_ref()?
            .items
            .iter()
            .find(|item| item.name == name)?
            .value
            .as_ref()
    }

    /// Paid amount in cents.
    pub fn amount_cents(&self) -> Option<i64> {
        self.item("Amount")?.as_cents()
    }

    pub fn receipt(&self) -> Option<String> {
        self.item("MpesaReceiptNumber")
            .map(CallbackValue::as_text)
            .filter(|r| !r.trim().is_empty())
    }

    pub fn phone_number(&self) -> Option<String> {
        self.item("PhoneNumber").map(CallbackValue::as_text)
    }
}
