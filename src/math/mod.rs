//! Arithmetic safety layer
//!
//! Overflow/underflow-checked integer operations used by every other
//! component. All value math in the protocol is u64 with u128 widened
//! intermediates; a failed check aborts the calling operation instead of
//! clamping or saturating.

use crate::error::{Result, RiskError};

/// Basis-point denominator: 10_000 bps = 100%
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Checked addition
pub fn safe_add(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(RiskError::ArithmeticOverflow)
}

/// Checked subtraction; fails with underflow when `a < b`
pub fn safe_sub(a: u64, b: u64) -> Result<u64> {
    a.checked_sub(b).ok_or(RiskError::ArithmeticUnderflow)
}

/// Computes ⌊a·b/c⌋ through a u128 intermediate.
///
/// The product a·b can exceed u64 without failing; only a quotient that
/// does not fit back into u64 is an overflow.
pub fn safe_mul_div(a: u64, b: u64, c: u64) -> Result<u64> {
    if c == 0 {
        return Err(RiskError::DivisionByZero);
    }
    let wide = (a as u128) * (b as u128);
    let quotient = wide / (c as u128);
    u64::try_from(quotient).map_err(|_| RiskError::ArithmeticOverflow)
}

/// `amount × rate_bps / 10_000`, the canonical fee/share computation
pub fn safe_percentage(amount: u64, rate_bps: u64) -> Result<u64> {
    safe_mul_div(amount, rate_bps, BPS_DENOMINATOR)
}

/// Relative change between two prices in bps: |new - old| / old × 10_000
pub fn relative_change_bps(old: u64, new: u64) -> Result<u64> {
    if old == 0 {
        return Err(RiskError::DivisionByZero);
    }
    let diff = if new >= old { new - old } else { old - new };
    safe_mul_div(diff, BPS_DENOMINATOR, old)
}
