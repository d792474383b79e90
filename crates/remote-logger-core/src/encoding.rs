//! Fixed-point encoding for the satellite message.
//!
//! Every numeric token in a message is `round(value * multiplier)` as an
//! integer, so the decoder only needs the multiplier table to restore the
//! reading to the precision the backend expects.

use log::warn;
use thiserror_no_std::Error;

/// Minimum timestamp length that still contains `YYYY-MM-DDTHH`.
pub const MIN_TIMESTAMP_LEN: usize = 13;

/// Length of the `YYMMDDHH` token.
pub const TIMESTAMP_TOKEN_LEN: usize = 8;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("timestamp is not an ISO-8601 date-hour prefix")]
    Format,
}

/// Scale `value` by `multiplier` and round half away from zero.
///
/// Results outside the `i32` range saturate; NaN encodes as 0.
pub fn encode(value: f32, multiplier: f32) -> i32 {
    let scaled = value as f64 * multiplier as f64;
    let rounded = if scaled >= 0.0 {
        scaled + 0.5
    } else {
        scaled - 0.5
    };

    if rounded.is_nan() {
        warn!("Encoding NaN reading as 0");
        return 0;
    }
    if rounded >= i32::MAX as f64 || rounded <= i32::MIN as f64 {
        warn!(
            "Encoded value {} x {} saturated to the i32 range",
            value, multiplier
        );
    }

    // `as` truncates toward zero and saturates at the bounds.
    rounded as i32
}

/// Inverse of [`encode`], accurate to within `0.5 / multiplier`.
pub fn decode(token: i32, multiplier: f32) -> f32 {
    (token as f64 / multiplier as f64) as f32
}

/// Pack the year/month/day/hour of an ISO-8601 timestamp into `YYMMDDHH`.
///
/// Minutes and seconds are dropped.
pub fn encode_timestamp(iso8601: &str) -> Result<heapless::String<TIMESTAMP_TOKEN_LEN>, EncodeError> {
    let b = iso8601.as_bytes();
    if b.len() < MIN_TIMESTAMP_LEN {
        return Err(EncodeError::Format);
    }

    let mut token = heapless::String::new();
    for range in [2..4, 5..7, 8..10, 11..13] {
        for &c in &b[range] {
            if !c.is_ascii_digit() {
                return Err(EncodeError::Format);
            }
            token.push(c as char).map_err(|_| EncodeError::Format)?;
        }
    }
    Ok(token)
}
