//! Fixed-point money helpers.
//!
//! Every amount the platform stores is `NUMERIC(10,2)`: at most two fractional
//! digits and eight integral ones. Inputs that would need rounding to fit are
//! rejected instead of being silently truncated.

use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits carried by every monetary value
pub const SCALE: u32 = 2;

/// Largest value a `NUMERIC(10,2)` column accepts
pub fn max_amount() -> Decimal {
    Decimal::new(99_999_999_99, SCALE)
}

/// Why a caller-supplied amount was refused
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount must not be negative")]
    Negative,

    #[error("amount must be greater than zero")]
    NotPositive,

    #[error("amount exceeds the maximum of 99999999.99")]
    TooLarge,

    #[error("amount must have at most two decimal places")]
    TooPrecise,
}

/// Checks an order amount: non-negative, in range, at most two decimal places.
///
/// Returns the amount rescaled to exactly two fractional digits.
pub fn order_amount(amount: Decimal) -> Result<Decimal, AmountError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AmountError::Negative);
    }
    fit(amount)
}

/// Checks a discount magnitude, which must be strictly positive.
pub fn magnitude(amount: Decimal) -> Result<Decimal, AmountError> {
    if amount <= Decimal::ZERO {
        return Err(AmountError::NotPositive);
    }
    fit(amount)
}

fn fit(amount: Decimal) -> Result<Decimal, AmountError> {
    if amount.normalize().scale() > SCALE {
        return Err(AmountError::TooPrecise);
    }
    if amount.abs() > max_amount() {
        return Err(AmountError::TooLarge);
    }
    Ok(with_scale(amount))
}

/// Rounds half away from zero to two places and pins the scale at two,
/// so `20` renders as `20.00`.
pub fn round(amount: Decimal) -> Decimal {
    with_scale(amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero))
}

fn with_scale(mut amount: Decimal) -> Decimal {
    // zero may come back as -0.00 from upstream arithmetic
    if amount.is_zero() {
        amount = Decimal::ZERO;
    }
    amount.rescale(SCALE);
    amount
}
