//! SDI-12 data response parsing.
//!
//! Bus framing (break, marking, command timing) belongs to the driver. This
//! module only turns the text of a `aD0!` reply into field values. A reply
//! looks like `0+1.234+18.7+3`: one address character, then every value
//! led by its own `+` or `-` sign.

use log::warn;

use super::{SensorError, SensorValues};

/// Parse a `D0!` data response into values in the order the sensor sent them.
///
/// Trailing CR/LF is ignored. A reply with no values, an address that is
/// not alphanumeric, a value without a sign or more values than a schema
/// can hold is [`SensorError::Malformed`].
pub fn parse_data_response(response: &str) -> Result<SensorValues, SensorError> {
    let response = response.trim_end_matches(['\r', '\n']);

    let mut chars = response.char_indices();
    match chars.next() {
        Some((_, address)) if address.is_ascii_alphanumeric() => {}
        _ => {
            warn!("SDI-12 response has no address: {:?}", response);
            return Err(SensorError::Malformed);
        }
    }

    let body = &response[1..];
    if !body.starts_with(['+', '-']) {
        warn!("SDI-12 response has no values: {:?}", response);
        return Err(SensorError::Malformed);
    }

    let mut values = SensorValues::new();
    let mut start = 0;
    for (i, c) in body.char_indices().skip(1) {
        if c == '+' || c == '-' {
            push_value(&mut values, &body[start..i])?;
            start = i;
        }
    }
    push_value(&mut values, &body[start..])?;

    Ok(values)
}

fn push_value(values: &mut SensorValues, token: &str) -> Result<(), SensorError> {
    let value = token.parse::<f32>().map_err(|_| {
        warn!("SDI-12 value {:?} is not a number", token);
        SensorError::Malformed
    })?;
    values.push(value).map_err(|_| SensorError::Malformed)
}
