//! Typed error taxonomy for the risk core
//!
//! Arithmetic and validation failures abort the whole enclosing operation;
//! no partial effects, no silent clamping. `CircuitOpen` is the one
//! non-fatal outcome a caller is expected to handle gracefully.

use crate::types::OperationKey;
use thiserror::Error;

/// All failures the risk core can surface to callers
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RiskError {
    #[error("price is stale: {age_secs}s old, max allowed {max_delay_secs}s")]
    StalePrice { age_secs: u64, max_delay_secs: u64 },

    #[error("price confidence too low: ratio {ratio_bps} bps, max allowed {max_ratio_bps} bps")]
    LowConfidence { ratio_bps: u64, max_ratio_bps: u64 },

    #[error("price manipulation detected at risk level {risk_level}")]
    ManipulationDetected { risk_level: u8 },

    #[error("circuit breaker open for {key}")]
    CircuitOpen { key: OperationKey },

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error("arithmetic underflow")]
    ArithmeticUnderflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("requested LTV {ltv_bps} bps exceeds allowed {max_allowed_bps} bps")]
    ExceedsMaxLtv { ltv_bps: u64, max_allowed_bps: u64 },

    #[error("unauthorized: admin capability mismatch")]
    Unauthorized,

    #[error("no feed or validated price for asset {0}")]
    UnknownAsset(String),
}

/// Shorthand used by every fallible operation in the core
pub type Result<T> = std::result::Result<T, RiskError>;
