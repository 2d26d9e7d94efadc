//! Conversions between annual percentage rates and periodic factors, plus the
//! fixed-installment annuity formula.

use super::money::Money;
use crate::error::{LedgerError, Result};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;

/// Highest annual percentage rate a product may carry.
pub const MAX_ANNUAL_RATE: Decimal = dec!(1000);

/// Rejects negative rates and rates above [`MAX_ANNUAL_RATE`].
pub fn validate_rates(annual_rate: Decimal, annual_late_rate: Decimal) -> Result<()> {
    for rate in [annual_rate, annual_late_rate] {
        if rate.is_sign_negative() && !rate.is_zero() {
            return Err(LedgerError::ValidationError(
                "Rates cannot be negative".to_string(),
            ));
        }
        if rate > MAX_ANNUAL_RATE {
            return Err(LedgerError::ValidationError(format!(
                "Rate {rate}% exceeds the maximum of {MAX_ANNUAL_RATE}%"
            )));
        }
    }
    Ok(())
}

/// Monthly factor for an annual percentage rate (12 -> 0.01).
pub fn monthly_rate(annual_rate: Decimal) -> Decimal {
    annual_rate / dec!(12) / dec!(100)
}

/// Daily factor for an annual percentage rate, on a 365-day year.
pub fn daily_rate(annual_rate: Decimal) -> Decimal {
    annual_rate / dec!(365) / dec!(100)
}

/// Fixed installment that amortizes `principal` over `term_count` periods at
/// `periodic_rate`: `P * r * (1+r)^n / ((1+r)^n - 1)`.
///
/// A zero rate degenerates to `P / n`. The result is not rounded; callers
/// settle it to cents.
pub fn installment_amount(principal: Money, periodic_rate: Decimal, term_count: i64) -> Result<Money> {
    if term_count <= 0 {
        return Err(LedgerError::InvalidTerm(term_count));
    }
    let n = Decimal::from(term_count);

    if periodic_rate.is_zero() {
        return Ok(Money::new(principal.value() / n));
    }

    let growth = (Decimal::ONE + periodic_rate)
        .checked_powu(term_count as u64)
        .ok_or_else(|| LedgerError::overflow("installment growth factor"))?;
    let denominator = growth - Decimal::ONE;
    if denominator.is_zero() {
        return Err(LedgerError::DivisionByZero("installment amount"));
    }

    let numerator = principal.checked_mul(periodic_rate)?.checked_mul(growth)?;
    numerator
        .value()
        .checked_div(denominator)
        .map(Money::new)
        .ok_or_else(|| LedgerError::overflow("installment amount"))
}
