//! Monetary amount validation.
//!
//! Balances and transfer amounts are exact decimals (`rust_decimal`), never
//! floats. Amounts are validated before any account is read.

use rust_decimal::Decimal;

use crate::error::CoreError;

/// Maximum number of fractional digits for a monetary amount.
pub const MAX_AMOUNT_SCALE: u32 = 2;

/// Validate a transfer amount.
///
/// Rules:
/// - Must be strictly positive.
/// - Must have at most [`MAX_AMOUNT_SCALE`] fractional digits (sub-cent
///   amounts are rejected rather than silently rounded).
pub fn validate_amount(amount: Decimal) -> Result<(), CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::InvalidAmount(format!(
            "Amount must be positive, got {amount}"
        )));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(CoreError::InvalidAmount(format!(
            "Amount must have at most {MAX_AMOUNT_SCALE} decimal places, got {amount}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn positive_two_decimal_amount_is_valid() {
        assert!(validate_amount(dec!(40.00)).is_ok());
        assert!(validate_amount(dec!(0.01)).is_ok());
        assert!(validate_amount(dec!(1000000)).is_ok());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = validate_amount(Decimal::ZERO).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount(_)));
    }

    #[test]
    fn negative_amount_is_rejected() {
        let err = validate_amount(dec!(-5.00)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount(_)));
    }

    #[test]
    fn sub_cent_amount_is_rejected() {
        let err = validate_amount(dec!(1.001)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidAmount(_)));
    }

    #[test]
    fn trailing_zeros_do_not_count_toward_scale() {
        // 1.1000 normalizes to 1.1 -- one fractional digit.
        assert!(validate_amount(dec!(1.1000)).is_ok());
    }
}
