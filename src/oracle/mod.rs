//! Oracle module - Price validation and manipulation detection
//!
//! Validates raw feed samples (staleness, confidence interval) and scans
//! the per-asset price history for adversarial patterns before any price
//! is allowed to drive lending decisions.

mod history;
mod manipulation;
mod validator;

pub use history::PriceHistory;
pub use manipulation::{DetectorParams, ManipulationDetector, ManipulationVerdict, PatternKind};
pub use validator::PriceValidator;

use serde::{Deserialize, Serialize};

/// Default capacity of the per-asset price history
pub const HISTORY_CAPACITY: usize = 100;

/// Per-asset feed configuration. Immutable except via admin update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    /// External feed identifier (e.g. an oracle account or pair symbol)
    pub feed_id: String,
    /// Decimal exponent of raw feed prices (price = raw * 10^exponent)
    pub exponent: i32,
    /// Expected update interval of the feed
    pub heartbeat_secs: u64,
    /// Maximum acceptable single-step relative deviation
    pub max_deviation_bps: u64,
    /// Maximum acceptable confidence/price ratio
    pub max_confidence_ratio_bps: u64,
    /// Maximum sample age before a price is considered stale
    pub max_price_delay_secs: u64,
}

impl PriceFeedConfig {
    /// Reject configs that could never validate any sample
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.feed_id.is_empty() {
            return Err(crate::error::RiskError::InvalidConfig(
                "feed_id must not be empty".into(),
            ));
        }
        if self.max_price_delay_secs == 0 {
            return Err(crate::error::RiskError::InvalidConfig(
                "max_price_delay_secs must be positive".into(),
            ));
        }
        if self.max_deviation_bps == 0 || self.max_deviation_bps > crate::math::BPS_DENOMINATOR {
            return Err(crate::error::RiskError::InvalidConfig(format!(
                "max_deviation_bps {} outside (0, 10000]",
                self.max_deviation_bps
            )));
        }
        if self.max_confidence_ratio_bps == 0
            || self.max_confidence_ratio_bps > crate::math::BPS_DENOMINATOR
        {
            return Err(crate::error::RiskError::InvalidConfig(format!(
                "max_confidence_ratio_bps {} outside (0, 10000]",
                self.max_confidence_ratio_bps
            )));
        }
        Ok(())
    }
}

/// A single observed price sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: u64,
    /// Half-width of the feed's confidence interval, same scale as price
    pub confidence: u64,
    pub timestamp: u64,
}

/// Validation outcome for one price request.
///
/// Derived, recomputed on every request; only the latest per asset is
/// retained in the validator's cache slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedPriceInfo {
    pub price: u64,
    pub confidence: u64,
    pub timestamp: u64,
    /// Composite 0-100 confidence in this price
    pub validation_score: u8,
    /// 0-3 severity from the manipulation detector
    pub manipulation_risk: u8,
    pub is_valid: bool,
}

impl ValidatedPriceInfo {
    /// Conservative lower bound of the confidence interval (collateral side)
    pub fn lower_bound(&self) -> u64 {
        self.price.saturating_sub(self.confidence)
    }

    /// Conservative upper bound of the confidence interval (debt side)
    pub fn upper_bound(&self) -> crate::error::Result<u64> {
        crate::math::safe_add(self.price, self.confidence)
    }
}
