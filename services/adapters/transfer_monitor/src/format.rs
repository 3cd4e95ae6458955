//! Display formatting for quantities, USD values and timestamps
//!
//! Formatting never fails: unparsable input is logged and passed through as
//! its raw text.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use tracing::warn;

use crate::raw::Scalar;
use directory::UNKNOWN;

/// Rendered for non-zero amounts that round to zero
pub const DUST_MARKER: &str = ">0";

const QUANTITY_DP: u32 = 6;
const USD_DP: u32 = 2;

/// Parse decimal text, accepting plain and scientific notation
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Token quantity at face value (the transfers endpoint carries no decimals),
/// rounded half-up to six places with trailing zeros trimmed
pub fn format_quantity(value: Option<&Scalar>) -> String {
    let Some(value) = value else {
        return UNKNOWN.to_string();
    };
    let text = value.as_text();
    let Some(amount) = parse_decimal(&text) else {
        if is_below_decimal_scale(&text) {
            return zero_or_dust(&text);
        }
        warn!("Failed to format quantity {:?}", text);
        return text;
    };

    // Decimal rounds digits past its 28-place scale away
    if amount.is_zero() {
        return zero_or_dust(&text);
    }
    let rounded = amount.round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_zero() {
        return DUST_MARKER.to_string();
    }
    rounded.normalize().to_string()
}

/// `$#,##0.00`, rounded half-up
pub fn format_usd(value: Option<&Scalar>) -> String {
    let Some(value) = value else {
        return UNKNOWN.to_string();
    };
    let text = value.as_text();
    let Some(amount) = parse_decimal(&text) else {
        warn!("Failed to format USD value {:?}", text);
        return text;
    };

    let mut rounded = amount.round_dp_with_strategy(USD_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(USD_DP);
    let rendered = rounded.to_string();

    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    format!("${}{}.{}", sign, group_thousands(whole), fraction)
}

/// Numeric USD value for comparisons, unrounded
pub fn usd_numeric(value: Option<&Scalar>) -> Option<f64> {
    match value? {
        Scalar::Number(n) => n.as_f64(),
        Scalar::Text(s) => s.trim().parse::<f64>().ok(),
        Scalar::Other(_) => None,
    }
}

/// ISO-8601 → `YYYY-MM-DD HH:MM:SS` in the timestamp's own offset.
/// Unparsable input is returned verbatim.
pub fn format_timestamp(timestamp: Option<&str>) -> String {
    const OUTPUT: &str = "%Y-%m-%d %H:%M:%S";

    let Some(timestamp) = timestamp else {
        return UNKNOWN.to_string();
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return dt.format(OUTPUT).to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, pattern) {
            return naive.format(OUTPUT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(timestamp, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return midnight.format(OUTPUT).to_string();
        }
    }

    warn!("Failed to format timestamp {:?}", timestamp);
    timestamp.to_string()
}

/// Any non-zero digit before the exponent
fn has_nonzero_mantissa(text: &str) -> bool {
    let mantissa = text.trim().split(['e', 'E']).next().unwrap_or_default();
    mantissa.chars().any(|ch| ('1'..='9').contains(&ch))
}

fn zero_or_dust(text: &str) -> String {
    if has_nonzero_mantissa(text) {
        DUST_MARKER.to_string()
    } else {
        "0".to_string()
    }
}

/// Numeric text whose exponent is past what `Decimal` accepts
fn is_below_decimal_scale(text: &str) -> bool {
    text.trim()
        .parse::<f64>()
        .is_ok_and(|value| value.is_finite() && value.abs() < 1e-6)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
