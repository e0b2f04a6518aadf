//! Locale-tolerant number parsing and locale-invariant formatting.
//!
//! Interchange files arrive with either `,` or `.` as the decimal separator.
//! Parsing normalises both; formatting always emits `.`.

/// Decimal places used for quantities, prices and totals.
pub const AMOUNT_PLACES: usize = 3;

/// Decimal places used for percentage and tax-like fields.
pub const PERCENT_PLACES: usize = 2;

/// Parses a decimal that may use `,` or `.` as separator.
///
/// When both separators are present the right-most one is taken as the
/// decimal separator and the other is treated as a thousands separator.
#[must_use]
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalised = match (trimmed.rfind(','), trimmed.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => trimmed.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => trimmed.replace(',', ""),
        (Some(_), None) => trimmed.replace(',', "."),
        _ => trimmed.to_string(),
    };

    normalised.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a decimal, falling back to `0` on failure.
#[must_use]
pub fn parse_decimal_or_zero(text: &str) -> f64 {
    parse_decimal(text).unwrap_or_default()
}

/// Parses an integer, accepting decimal text with no fractional part.
#[must_use]
pub fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    parse_decimal(trimmed)
        .filter(|value| value.fract() == 0.0 && value.abs() < 9.0e15)
        .map(|value| value as i64)
}

/// Parses an integer, falling back to `0` on failure.
#[must_use]
pub fn parse_integer_or_zero(text: &str) -> i64 {
    parse_integer(text).unwrap_or_default()
}

/// Formats a value fixed-point with the given number of places.
///
/// Non-finite values format as zero.
#[must_use]
pub fn format_decimal(value: f64, places: usize) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    // avoid emitting "-0.000"
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value:.places$}")
}

/// Re-formats decimal text, defaulting to zero when it cannot be parsed.
#[must_use]
pub fn format_decimal_text(text: &str, places: usize) -> String {
    format_decimal(parse_decimal_or_zero(text), places)
}
