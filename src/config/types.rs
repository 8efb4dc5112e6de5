//! Runtime configuration sections
//!
//! Flat, file/env-friendly settings converted into the richer domain
//! config types at startup.

use serde::Deserialize;

use crate::breaker::ThresholdConfig;
use crate::oracle::{DetectorParams, PriceFeedConfig};
use crate::risk::penalty::PenaltyDistributionConfig;
use crate::risk::{CollateralPolicy, PenaltyRateConfig, RiskThresholds};
use crate::types::{AssetClass, BorrowerTier};

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSettings {
    /// Points summed by the cumulative-drift check
    pub drift_window: usize,
    /// Drift threshold as a factor of feed deviation (bps, 15000 = 1.5x)
    pub drift_factor_bps: u64,
    /// Confidence-ratio tightening that counts as suspicious (bps)
    pub mismatch_confidence_gain_bps: u64,
    /// Points scanned for a pump/dump round trip
    pub oscillation_window: usize,
}

impl DetectorSettings {
    pub fn to_params(&self) -> DetectorParams {
        DetectorParams {
            drift_window: self.drift_window,
            drift_factor_bps: self.drift_factor_bps,
            mismatch_confidence_gain_bps: self.mismatch_confidence_gain_bps,
            oscillation_window: self.oscillation_window,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSettings {
    /// Failures in-window beyond which a breaker opens
    pub failure_threshold: u32,
    /// Rolling accounting window in seconds
    pub time_window_secs: u64,
    /// Seconds in Open before a recovery probe
    pub recovery_timeout_secs: u64,
    /// In-window volume beyond which a breaker opens
    pub volume_threshold: u64,
}

impl BreakerSettings {
    pub fn to_thresholds(&self) -> ThresholdConfig {
        ThresholdConfig {
            failure_threshold: self.failure_threshold,
            time_window_secs: self.time_window_secs,
            recovery_timeout_secs: self.recovery_timeout_secs,
            volume_threshold: self.volume_threshold,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskSettings {
    /// Warning LTV threshold (bps)
    pub warning_bps: u64,
    /// Liquidation LTV threshold (bps)
    pub liquidation_bps: u64,
    /// Global hard LTV cap (bps)
    pub global_cap_bps: u64,
    /// Max LTV for blue-chip collateral (bps)
    pub blue_cap_bps: u64,
    /// Max LTV for stablecoin collateral (bps)
    pub stable_cap_bps: u64,
    /// Max LTV for volatile collateral (bps)
    pub volatile_cap_bps: u64,
    /// Tier LTV bonuses (bps)
    pub silver_bonus_bps: u64,
    pub gold_bonus_bps: u64,
    pub platinum_bonus_bps: u64,
}

impl RiskSettings {
    pub fn to_thresholds(&self) -> RiskThresholds {
        RiskThresholds {
            warning_bps: self.warning_bps,
            liquidation_bps: self.liquidation_bps,
        }
    }

    pub fn to_policy(&self) -> CollateralPolicy {
        let mut policy = CollateralPolicy {
            base_caps: Default::default(),
            tier_bonus: Default::default(),
            global_cap_bps: self.global_cap_bps,
        };
        policy.base_caps.insert(AssetClass::Blue, self.blue_cap_bps);
        policy
            .base_caps
            .insert(AssetClass::Stable, self.stable_cap_bps);
        policy
            .base_caps
            .insert(AssetClass::Volatile, self.volatile_cap_bps);
        policy.tier_bonus.insert(BorrowerTier::Standard, 0);
        policy
            .tier_bonus
            .insert(BorrowerTier::Silver, self.silver_bonus_bps);
        policy
            .tier_bonus
            .insert(BorrowerTier::Gold, self.gold_bonus_bps);
        policy
            .tier_bonus
            .insert(BorrowerTier::Platinum, self.platinum_bonus_bps);
        policy
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PenaltySettings {
    pub base_rate_bps: u64,
    pub min_rate_bps: u64,
    pub max_rate_bps: u64,
}

impl PenaltySettings {
    pub fn to_rate_config(&self) -> PenaltyRateConfig {
        PenaltyRateConfig {
            base_rate_bps: self.base_rate_bps,
            min_rate_bps: self.min_rate_bps,
            max_rate_bps: self.max_rate_bps,
            asset_multiplier_bps: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionSettings {
    pub liquidator_share_bps: u64,
    pub platform_share_bps: u64,
    pub insurance_share_bps: u64,
    pub borrower_protection: bool,
}

impl DistributionSettings {
    pub fn to_distribution_config(&self) -> PenaltyDistributionConfig {
        PenaltyDistributionConfig {
            liquidator_share_bps: self.liquidator_share_bps,
            platform_share_bps: self.platform_share_bps,
            insurance_share_bps: self.insurance_share_bps,
            borrower_protection: self.borrower_protection,
        }
    }
}

/// Feed parameters applied when an asset is registered without an
/// explicit per-feed config
#[derive(Debug, Clone, Deserialize)]
pub struct FeedDefaults {
    pub heartbeat_secs: u64,
    pub max_deviation_bps: u64,
    pub max_confidence_ratio_bps: u64,
    pub max_price_delay_secs: u64,
}

impl FeedDefaults {
    pub fn to_feed_config(&self, feed_id: String, exponent: i32) -> PriceFeedConfig {
        PriceFeedConfig {
            feed_id,
            exponent,
            heartbeat_secs: self.heartbeat_secs,
            max_deviation_bps: self.max_deviation_bps,
            max_confidence_ratio_bps: self.max_confidence_ratio_bps,
            max_price_delay_secs: self.max_price_delay_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalSettings {
    /// Journal root directory
    pub data_dir: String,
    /// Enable the CSV event journal
    pub csv_enabled: bool,
}
