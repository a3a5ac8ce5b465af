//! Free-text amount normalization.

use thiserror::Error;

/// Why an amount string was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AmountError {
    /// No digits before the decimal point.
    #[error("amount has no digits")]
    Unparseable,

    /// Parsed to zero.
    #[error("amount must be positive")]
    NotPositive,

    /// Does not fit in a `u64`.
    #[error("amount is too large")]
    Overflow,
}

/// Parse a user-typed amount.
///
/// Keeps the digits of the integral part (everything before the first `.`)
/// and ignores currency signs, separators and any other characters, so
/// `"$1,200abc"` is 1200. Fails closed: input without digits, zero, or a
/// value that overflows is an error, never a guess.
pub fn parse_amount(text: &str) -> Result<u64, AmountError> {
    let integral = text.find('.').map_or(text, |dot| &text[..dot]);

    let mut value: Option<u64> = None;
    for digit in integral.chars().filter_map(|c| c.to_digit(10)) {
        let next = value
            .unwrap_or(0)
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or(AmountError::Overflow)?;
        value = Some(next);
    }

    match value {
        None => Err(AmountError::Unparseable),
        Some(0) => Err(AmountError::NotPositive),
        Some(v) => Ok(v),
    }
}
