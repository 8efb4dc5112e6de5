//! Price validator
//!
//! Per-asset staleness and confidence checks producing a validated price
//! record. Accepted samples feed the bounded history and the manipulation
//! detector; only the latest result per asset is cached.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::{Result, RiskError};
use crate::math::{safe_mul_div, BPS_DENOMINATOR};
use crate::oracle::{
    ManipulationDetector, ManipulationVerdict, PriceFeedConfig, PriceHistory, PricePoint,
    ValidatedPriceInfo, HISTORY_CAPACITY,
};
use crate::types::AssetId;

/// Score deducted per manipulation risk level
const RISK_SCORE_PENALTY: u8 = 25;

/// Feed table, price histories and the per-asset validation cache
#[derive(Debug)]
pub struct PriceValidator {
    feeds: HashMap<AssetId, PriceFeedConfig>,
    histories: HashMap<AssetId, PriceHistory>,
    cache: HashMap<AssetId, ValidatedPriceInfo>,
    verdicts: HashMap<AssetId, ManipulationVerdict>,
    detector: ManipulationDetector,
}

impl PriceValidator {
    pub fn new(detector: ManipulationDetector) -> Self {
        Self {
            feeds: HashMap::new(),
            histories: HashMap::new(),
            cache: HashMap::new(),
            verdicts: HashMap::new(),
            detector,
        }
    }

    /// Register or replace a feed config. Validated before it is applied.
    pub fn set_feed_config(&mut self, asset: AssetId, config: PriceFeedConfig) -> Result<()> {
        config.validate()?;
        debug!(asset = %asset, feed = %config.feed_id, "feed config updated");
        self.feeds.insert(asset, config);
        Ok(())
    }

    pub fn feed_config(&self, asset: &AssetId) -> Result<&PriceFeedConfig> {
        self.feeds
            .get(asset)
            .ok_or_else(|| RiskError::UnknownAsset(asset.to_string()))
    }

    /// Last validated info for an asset, if any request ever succeeded the
    /// staleness/confidence gate (including manipulation-flagged ones).
    pub fn cached(&self, asset: &AssetId) -> Option<ValidatedPriceInfo> {
        self.cache.get(asset).copied()
    }

    pub fn history_len(&self, asset: &AssetId) -> usize {
        self.histories.get(asset).map(|h| h.len()).unwrap_or(0)
    }

    /// Number of assets with a registered feed
    pub fn tracked_assets(&self) -> usize {
        self.feeds.len()
    }

    /// Detector verdict from the asset's most recent validation
    pub fn last_verdict(&self, asset: &AssetId) -> Option<&ManipulationVerdict> {
        self.verdicts.get(asset)
    }

    /// Validate one raw feed sample.
    ///
    /// Checks run in order: staleness, confidence ratio, manipulation
    /// analysis, history append. A sample that fails any check leaves no
    /// trace; a sample that passes them enters the history even when the
    /// detector flags it, so the flagged move stays visible to subsequent
    /// pattern scans.
    pub fn validate(
        &mut self,
        asset: &AssetId,
        raw_price: u64,
        confidence: u64,
        observed_at: u64,
        now: u64,
    ) -> Result<ValidatedPriceInfo> {
        let feed = self
            .feeds
            .get(asset)
            .ok_or_else(|| RiskError::UnknownAsset(asset.to_string()))?;

        let age_secs = now.saturating_sub(observed_at);
        if age_secs > feed.max_price_delay_secs {
            warn!(
                asset = %asset,
                age_secs,
                max_delay_secs = feed.max_price_delay_secs,
                "rejected stale price"
            );
            return Err(RiskError::StalePrice {
                age_secs,
                max_delay_secs: feed.max_price_delay_secs,
            });
        }

        // A zero price fails the ratio computation with DivisionByZero
        let ratio_bps = safe_mul_div(confidence, BPS_DENOMINATOR, raw_price)?;
        if ratio_bps > feed.max_confidence_ratio_bps {
            warn!(
                asset = %asset,
                ratio_bps,
                max_ratio_bps = feed.max_confidence_ratio_bps,
                "rejected low-confidence price"
            );
            return Err(RiskError::LowConfidence {
                ratio_bps,
                max_ratio_bps: feed.max_confidence_ratio_bps,
            });
        }

        let point = PricePoint {
            price: raw_price,
            confidence,
            timestamp: observed_at,
        };
        let history = self
            .histories
            .entry(asset.clone())
            .or_insert_with(|| PriceHistory::new(HISTORY_CAPACITY));

        // Analyze before appending: a failed check leaves no trace, and
        // the append itself still rejects timestamp regressions.
        let verdict = self.detector.analyze(asset.as_str(), history, &point, feed)?;
        history.push(point)?;
        self.verdicts.insert(asset.clone(), verdict.clone());

        let info = ValidatedPriceInfo {
            price: raw_price,
            confidence,
            timestamp: observed_at,
            validation_score: 100u8.saturating_sub(RISK_SCORE_PENALTY * verdict.risk_level),
            manipulation_risk: verdict.risk_level,
            is_valid: !verdict.is_manipulation,
        };
        self.cache.insert(asset.clone(), info);

        debug!(
            asset = %asset,
            price = raw_price,
            score = info.validation_score,
            risk = info.manipulation_risk,
            "price validated"
        );

        Ok(info)
    }

    /// The configured detector, for threshold introspection
    pub fn detector(&self) -> &ManipulationDetector {
        &self.detector
    }
}
