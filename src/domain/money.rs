use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

/// Money is represented as fixed-point decimals to avoid floating-point drift.
/// Each currency declares how many fractional digits it keeps (its scale),
/// e.g. INR keeps 2 and ORA keeps 8.
pub type Amount = Decimal;

/// Format an amount with exactly `scale` fractional digits.
/// Example: (50, 2) -> "50.00", (0.05, 8) -> "0.05000000"
pub fn format_amount(amount: Amount, scale: u32) -> String {
    let mut value = amount.round_dp_with_strategy(scale, RoundingStrategy::ToZero);
    value.rescale(scale);
    value.to_string()
}

/// Parse a decimal string into an amount.
/// Example: "50.00" -> 50.00, "12.5" -> 12.5, ".5" -> 0.5
///
/// Only plain decimal notation is accepted: no exponents, no grouping
/// separators, no `NaN`/`inf` spellings.
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::Empty);
    }

    let digits = input.strip_prefix('-').unwrap_or(input);
    let mut seen_dot = false;
    let mut seen_digit = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return Err(ParseAmountError::InvalidFormat(input.to_string())),
        }
    }
    if !seen_digit {
        return Err(ParseAmountError::InvalidFormat(input.to_string()));
    }

    // "12." and ".5" are fine for humans but not for Decimal::from_str
    let normalized = match (digits.starts_with('.'), digits.ends_with('.')) {
        (true, _) => format!("0{}", digits),
        (_, true) => digits.trim_end_matches('.').to_string(),
        _ => digits.to_string(),
    };

    let value =
        Decimal::from_str(&normalized).map_err(|_| ParseAmountError::OutOfRange(input.to_string()))?;
    Ok(if input.starts_with('-') { -value } else { value })
}

/// Returns true if `amount` has no more significant fractional digits than `scale`.
/// Trailing zeros don't count: 1.50 fits scale 1.
pub fn fits_scale(amount: Amount, scale: u32) -> bool {
    amount.normalize().scale() <= scale
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseAmountError {
    #[error("amount is empty")]
    Empty,

    #[error("invalid money format: '{0}'")]
    InvalidFormat(String),

    #[error("amount out of range: '{0}'")]
    OutOfRange(String),
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec!(50), 2), "50.00");
        assert_eq!(format_amount(dec!(12.34), 2), "12.34");
        assert_eq!(format_amount(dec!(0.05), 8), "0.05000000");
        assert_eq!(format_amount(dec!(0), 2), "0.00");
        assert_eq!(format_amount(dec!(-1.5), 2), "-1.50");
        // Extra digits are cut, never rounded up
        assert_eq!(format_amount(dec!(1.999), 2), "1.99");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50.00"), Ok(dec!(50)));
        assert_eq!(parse_amount("50"), Ok(dec!(50)));
        assert_eq!(parse_amount("12.5"), Ok(dec!(12.5)));
        assert_eq!(parse_amount(".5"), Ok(dec!(0.5)));
        assert_eq!(parse_amount("7."), Ok(dec!(7)));
        assert_eq!(parse_amount(" 0.00000001 "), Ok(dec!(0.00000001)));
        assert_eq!(parse_amount("-3.25"), Ok(dec!(-3.25)));
    }

    #[test]
    fn test_parse_amount_invalid() {
        assert_eq!(parse_amount(""), Err(ParseAmountError::Empty));
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("12.34.56").is_err());
        assert!(parse_amount("NaN").is_err());
        assert!(parse_amount("inf").is_err());
        assert!(parse_amount("1e5").is_err());
        assert!(parse_amount("1,000").is_err());
        assert!(parse_amount(".").is_err());
        assert!(parse_amount("-").is_err());
    }

    #[test]
    fn test_fits_scale() {
        assert!(fits_scale(dec!(1.5), 2));
        assert!(fits_scale(dec!(1.50), 1));
        assert!(fits_scale(dec!(100), 0));
        assert!(!fits_scale(dec!(0.001), 2));
        assert!(fits_scale(dec!(0.00000001), 8));
    }
}
