//! STK push password and timestamp.
//!
//! ```text
//! Timestamp = yyyyMMddHHmmss in East Africa Time (UTC+3)
//! Password  = base64(BusinessShortCode + PassKey + Timestamp)
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

/// Offset of East Africa Time from UTC. No daylight saving.
const EAT_OFFSET_HOURS: i64 = 3;

/// Formats `now` as the gateway's local timestamp.
pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    (now.naive_utc() + Duration::hours(EAT_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Derives the STK password for one request.
pub fn stk_password(short_code: &str, pass_key: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, pass_key, timestamp))
}
