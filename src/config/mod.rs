//! Configuration management for LendGuard
//!
//! Loads from YAML/TOML files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

/// Main risk-core configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    pub detector: DetectorSettings,
    pub breaker: BreakerSettings,
    pub risk: RiskSettings,
    pub penalty: PenaltySettings,
    pub distribution: DistributionSettings,
    pub feed_defaults: FeedDefaults,
    pub journal: JournalSettings,
}

impl CoreConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Detector defaults
            .set_default("detector.drift_window", 10)?
            .set_default("detector.drift_factor_bps", 15_000)?
            .set_default("detector.mismatch_confidence_gain_bps", 50)?
            .set_default("detector.oscillation_window", 6)?
            // Breaker defaults
            .set_default("breaker.failure_threshold", 5)?
            .set_default("breaker.time_window_secs", 300)?
            .set_default("breaker.recovery_timeout_secs", 600)?
            .set_default("breaker.volume_threshold", 1_000_000_000i64)?
            // Risk defaults
            .set_default("risk.warning_bps", 8_500)?
            .set_default("risk.liquidation_bps", 9_500)?
            .set_default("risk.global_cap_bps", 9_900)?
            .set_default("risk.blue_cap_bps", 8_000)?
            .set_default("risk.stable_cap_bps", 9_000)?
            .set_default("risk.volatile_cap_bps", 6_000)?
            .set_default("risk.silver_bonus_bps", 100)?
            .set_default("risk.gold_bonus_bps", 250)?
            .set_default("risk.platinum_bonus_bps", 500)?
            // Penalty defaults
            .set_default("penalty.base_rate_bps", 500)?
            .set_default("penalty.min_rate_bps", 200)?
            .set_default("penalty.max_rate_bps", 1_500)?
            // Distribution defaults
            .set_default("distribution.liquidator_share_bps", 5_000)?
            .set_default("distribution.platform_share_bps", 3_000)?
            .set_default("distribution.insurance_share_bps", 1_500)?
            .set_default("distribution.borrower_protection", true)?
            // Feed defaults
            .set_default("feed_defaults.heartbeat_secs", 60)?
            .set_default("feed_defaults.max_deviation_bps", 1_000)?
            .set_default("feed_defaults.max_confidence_ratio_bps", 200)?
            .set_default("feed_defaults.max_price_delay_secs", 120)?
            // Journal defaults
            .set_default("journal.data_dir", "./data")?
            .set_default("journal.csv_enabled", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (LENDGUARD_*)
            .add_source(Environment::with_prefix("LENDGUARD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let core_config: CoreConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        core_config.validate().context("Invalid configuration")?;

        Ok(core_config)
    }

    /// Reject configurations that violate core invariants before any of
    /// them is applied
    pub fn validate(&self) -> Result<()> {
        self.detector.to_params().validate()?;
        self.breaker.to_thresholds().validate()?;
        self.risk.to_thresholds().validate()?;
        self.risk.to_policy().validate()?;
        self.penalty.to_rate_config().validate()?;
        self.distribution.to_distribution_config().validate()?;
        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "warn={}bps liq={}bps cap={}bps breaker={}x/{}s penalty={}bps dist={}/{}/{}",
            self.risk.warning_bps,
            self.risk.liquidation_bps,
            self.risk.global_cap_bps,
            self.breaker.failure_threshold,
            self.breaker.time_window_secs,
            self.penalty.base_rate_bps,
            self.distribution.liquidator_share_bps,
            self.distribution.platform_share_bps,
            self.distribution.insurance_share_bps,
        )
    }
}

impl std::fmt::Display for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
