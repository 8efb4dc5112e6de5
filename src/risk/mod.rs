//! Risk engine - LTV computation and liquidation decisions
//!
//! Implements:
//! - Single- and multi-asset loan-to-value, priced conservatively against
//!   the confidence interval (collateral low, debt high)
//! - Per-class/per-tier maximum LTV policy with a global hard cap
//! - Health tiering (Healthy / Warning / Liquidatable)
//! - Dynamic liquidation penalty rates driven by market conditions

pub mod penalty;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RiskError};
use crate::math::{safe_add, safe_mul_div, BPS_DENOMINATOR};
use crate::oracle::ValidatedPriceInfo;
use crate::types::{AssetClass, AssetId, BorrowPosition, BorrowerTier, LiquidationDecision, RiskTier};

/// Per-class LTV caps, tier bonuses and the global hard ceiling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollateralPolicy {
    /// Maximum LTV per asset class, in bps
    pub base_caps: HashMap<AssetClass, u64>,
    /// Additional LTV headroom per borrower tier, in bps
    pub tier_bonus: HashMap<BorrowerTier, u64>,
    /// No cap+bonus combination may exceed this
    pub global_cap_bps: u64,
}

impl Default for CollateralPolicy {
    fn default() -> Self {
        let mut base_caps = HashMap::new();
        base_caps.insert(AssetClass::Blue, 8_000);
        base_caps.insert(AssetClass::Stable, 9_000);
        base_caps.insert(AssetClass::Volatile, 6_000);
        let mut tier_bonus = HashMap::new();
        tier_bonus.insert(BorrowerTier::Standard, 0);
        tier_bonus.insert(BorrowerTier::Silver, 100);
        tier_bonus.insert(BorrowerTier::Gold, 250);
        tier_bonus.insert(BorrowerTier::Platinum, 500);
        Self {
            base_caps,
            tier_bonus,
            global_cap_bps: 9_900,
        }
    }
}

impl CollateralPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.global_cap_bps == 0 || self.global_cap_bps >= BPS_DENOMINATOR {
            return Err(RiskError::InvalidConfig(format!(
                "global_cap_bps {} outside (0, 10000)",
                self.global_cap_bps
            )));
        }
        for (class, cap) in &self.base_caps {
            if *cap == 0 || *cap >= BPS_DENOMINATOR {
                return Err(RiskError::InvalidConfig(format!(
                    "base cap {cap} for {class} outside (0, 10000)"
                )));
            }
        }
        for (tier, bonus) in &self.tier_bonus {
            if *bonus >= BPS_DENOMINATOR {
                return Err(RiskError::InvalidConfig(format!(
                    "tier bonus {bonus} for {tier} out of range"
                )));
            }
        }
        Ok(())
    }
}

/// Warning and liquidation LTV thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub warning_bps: u64,
    pub liquidation_bps: u64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            warning_bps: 8_500,
            liquidation_bps: 9_500,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.warning_bps == 0 || self.warning_bps >= self.liquidation_bps {
            return Err(RiskError::InvalidConfig(format!(
                "warning_bps {} must be positive and below liquidation_bps {}",
                self.warning_bps, self.liquidation_bps
            )));
        }
        Ok(())
    }
}

/// Liquidation penalty rate parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyRateConfig {
    pub base_rate_bps: u64,
    pub min_rate_bps: u64,
    pub max_rate_bps: u64,
    /// Per-asset multiplier in bps of the base rate; 10_000 when absent
    pub asset_multiplier_bps: HashMap<AssetId, u64>,
}

impl Default for PenaltyRateConfig {
    fn default() -> Self {
        Self {
            base_rate_bps: 500,
            min_rate_bps: 200,
            max_rate_bps: 1_500,
            asset_multiplier_bps: HashMap::new(),
        }
    }
}

impl PenaltyRateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_rate_bps == 0 {
            return Err(RiskError::InvalidConfig(
                "base_rate_bps must be positive".into(),
            ));
        }
        if self.min_rate_bps > self.max_rate_bps {
            return Err(RiskError::InvalidConfig(format!(
                "min_rate_bps {} above max_rate_bps {}",
                self.min_rate_bps, self.max_rate_bps
            )));
        }
        if self.max_rate_bps > BPS_DENOMINATOR {
            return Err(RiskError::InvalidConfig(format!(
                "max_rate_bps {} above 10000",
                self.max_rate_bps
            )));
        }
        for (asset, mult) in &self.asset_multiplier_bps {
            if *mult == 0 {
                return Err(RiskError::InvalidConfig(format!(
                    "asset multiplier for {asset} must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Market stress inputs for dynamic penalty adjustment, each 0-100
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MarketConditionFactors {
    pub volatility_level: u8,
    pub liquidity_factor: u8,
    pub price_stability: u8,
    pub last_updated: u64,
}

impl Default for MarketConditionFactors {
    fn default() -> Self {
        Self {
            volatility_level: 30,
            liquidity_factor: 70,
            price_stability: 80,
            last_updated: 0,
        }
    }
}

impl MarketConditionFactors {
    pub fn validate(&self) -> Result<()> {
        if self.volatility_level > 100 || self.liquidity_factor > 100 || self.price_stability > 100
        {
            return Err(RiskError::InvalidConfig(
                "market condition factors must be within 0-100".into(),
            ));
        }
        Ok(())
    }

    /// Volatility step-up applied to the penalty rate
    fn volatility_adj_bps(&self) -> u64 {
        match self.volatility_level {
            80..=u8::MAX => 5_000, // +50%
            50..=79 => 2_500,      // +25%
            _ => 0,
        }
    }

    /// Thin-liquidity step-up applied to the penalty rate
    fn liquidity_adj_bps(&self) -> u64 {
        match self.liquidity_factor {
            0..=20 => 2_500, // +25%
            21..=50 => 1_000, // +10%
            _ => 0,
        }
    }
}

/// Computes position LTV, health tier and dynamic penalty rates.
///
/// Holds only policy; positions and prices are supplied per call.
#[derive(Debug)]
pub struct RiskEngine {
    policy: CollateralPolicy,
    thresholds: RiskThresholds,
    penalty_rates: PenaltyRateConfig,
    market: MarketConditionFactors,
    asset_classes: HashMap<AssetId, AssetClass>,
}

impl RiskEngine {
    pub fn new(
        policy: CollateralPolicy,
        thresholds: RiskThresholds,
        penalty_rates: PenaltyRateConfig,
    ) -> Result<Self> {
        policy.validate()?;
        thresholds.validate()?;
        penalty_rates.validate()?;
        Ok(Self {
            policy,
            thresholds,
            penalty_rates,
            market: MarketConditionFactors::default(),
            asset_classes: HashMap::new(),
        })
    }

    pub fn set_asset_class(&mut self, asset: AssetId, class: AssetClass) {
        self.asset_classes.insert(asset, class);
    }

    pub fn set_policy(&mut self, policy: CollateralPolicy) -> Result<()> {
        policy.validate()?;
        self.policy = policy;
        Ok(())
    }

    pub fn set_thresholds(&mut self, thresholds: RiskThresholds) -> Result<()> {
        thresholds.validate()?;
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn set_penalty_rates(&mut self, rates: PenaltyRateConfig) -> Result<()> {
        rates.validate()?;
        self.penalty_rates = rates;
        Ok(())
    }

    pub fn set_market_conditions(&mut self, market: MarketConditionFactors) -> Result<()> {
        market.validate()?;
        self.market = market;
        Ok(())
    }

    pub fn market_conditions(&self) -> MarketConditionFactors {
        self.market
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    fn class_of(&self, asset: &AssetId) -> AssetClass {
        self.asset_classes
            .get(asset)
            .copied()
            .unwrap_or_default()
    }

    /// Total collateral value at the conservative lower price bound
    fn collateral_value(
        &self,
        position: &BorrowPosition,
        prices: &HashMap<AssetId, ValidatedPriceInfo>,
    ) -> Result<u64> {
        let mut total: u64 = 0;
        for (asset, amount) in &position.collateral {
            let info = prices
                .get(asset)
                .ok_or_else(|| RiskError::UnknownAsset(asset.to_string()))?;
            let value = safe_mul_div(*amount, info.lower_bound(), 1)?;
            total = safe_add(total, value)?;
        }
        Ok(total)
    }

    /// Borrowed value at the conservative upper price bound
    fn borrowed_value(
        &self,
        position: &BorrowPosition,
        prices: &HashMap<AssetId, ValidatedPriceInfo>,
    ) -> Result<u64> {
        let info = prices
            .get(&position.borrowed_asset)
            .ok_or_else(|| RiskError::UnknownAsset(position.borrowed_asset.to_string()))?;
        safe_mul_div(position.borrowed_amount, info.upper_bound()?, 1)
    }

    /// Composite LTV in bps: borrowed_value / collateral_value x 10000.
    ///
    /// Multi-asset collateral is value-weighted: the ratio of totals, not
    /// an average of per-asset ratios. Zero collateral value with debt
    /// outstanding fails with DivisionByZero rather than inventing a
    /// number.
    pub fn compute_ltv(
        &self,
        position: &BorrowPosition,
        prices: &HashMap<AssetId, ValidatedPriceInfo>,
    ) -> Result<u64> {
        let collateral = self.collateral_value(position, prices)?;
        let borrowed = self.borrowed_value(position, prices)?;
        safe_mul_div(borrowed, BPS_DENOMINATOR, collateral)
    }

    /// Health classification for an LTV
    pub fn risk_tier(&self, ltv_bps: u64) -> RiskTier {
        if ltv_bps >= self.thresholds.liquidation_bps {
            RiskTier::Liquidatable
        } else if ltv_bps >= self.thresholds.warning_bps {
            RiskTier::Warning
        } else {
            RiskTier::Healthy
        }
    }

    /// Maximum LTV a position may be originated at: per-class base cap
    /// plus tier bonus, clipped to the global hard cap. Multi-asset
    /// positions take the most conservative cap across their collateral.
    pub fn max_allowed_ltv(&self, position: &BorrowPosition, tier: BorrowerTier) -> Result<u64> {
        let bonus = self.policy.tier_bonus.get(&tier).copied().unwrap_or(0);
        let mut cap: Option<u64> = None;
        for (asset, _) in &position.collateral {
            let class = self.class_of(asset);
            let base = self
                .policy
                .base_caps
                .get(&class)
                .copied()
                .ok_or_else(|| {
                    RiskError::InvalidConfig(format!("no base cap configured for {class}"))
                })?;
            let allowed = safe_add(base, bonus)?.min(self.policy.global_cap_bps);
            cap = Some(cap.map_or(allowed, |c| c.min(allowed)));
        }
        cap.ok_or_else(|| RiskError::InvalidConfig("position has no collateral".into()))
    }

    /// Origination gate: reject a borrow that would open beyond the
    /// allowed LTV for this collateral and tier.
    pub fn check_origination(
        &self,
        position: &BorrowPosition,
        prices: &HashMap<AssetId, ValidatedPriceInfo>,
        tier: BorrowerTier,
    ) -> Result<u64> {
        let ltv = self.compute_ltv(position, prices)?;
        let max_allowed = self.max_allowed_ltv(position, tier)?;
        if ltv > max_allowed {
            warn!(
                borrower = %position.borrower,
                ltv_bps = ltv,
                max_allowed_bps = max_allowed,
                "borrow rejected at origination"
            );
            return Err(RiskError::ExceedsMaxLtv {
                ltv_bps: ltv,
                max_allowed_bps: max_allowed,
            });
        }
        Ok(ltv)
    }

    /// Dynamic penalty rate for liquidating this position:
    /// base x asset_multiplier x (1 + volatility_adj) x (1 + liquidity_adj),
    /// clamped into [min_rate, max_rate]. Multi-asset positions take the
    /// highest multiplier across their collateral.
    pub fn penalty_rate_bps(&self, position: &BorrowPosition) -> Result<u64> {
        let multiplier = position
            .collateral
            .iter()
            .map(|(asset, _)| {
                self.penalty_rates
                    .asset_multiplier_bps
                    .get(asset)
                    .copied()
                    .unwrap_or(BPS_DENOMINATOR)
            })
            .max()
            .unwrap_or(BPS_DENOMINATOR);

        let mut rate = safe_mul_div(self.penalty_rates.base_rate_bps, multiplier, BPS_DENOMINATOR)?;
        rate = safe_mul_div(
            rate,
            safe_add(BPS_DENOMINATOR, self.market.volatility_adj_bps())?,
            BPS_DENOMINATOR,
        )?;
        rate = safe_mul_div(
            rate,
            safe_add(BPS_DENOMINATOR, self.market.liquidity_adj_bps())?,
            BPS_DENOMINATOR,
        )?;

        Ok(rate.clamp(self.penalty_rates.min_rate_bps, self.penalty_rates.max_rate_bps))
    }

    /// Full liquidation check: LTV, tier, and penalty rate when the
    /// position is past the liquidation threshold.
    pub fn check_liquidation(
        &self,
        position: &BorrowPosition,
        prices: &HashMap<AssetId, ValidatedPriceInfo>,
    ) -> Result<LiquidationDecision> {
        let ltv = self.compute_ltv(position, prices)?;
        let decision = match self.risk_tier(ltv) {
            RiskTier::Healthy => LiquidationDecision::None,
            RiskTier::Warning => LiquidationDecision::Warn { ltv_bps: ltv },
            RiskTier::Liquidatable => LiquidationDecision::Liquidatable {
                ltv_bps: ltv,
                penalty_rate_bps: self.penalty_rate_bps(position)?,
            },
        };
        debug!(borrower = %position.borrower, ltv_bps = ltv, ?decision, "liquidation check");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(p: u64, conf: u64) -> ValidatedPriceInfo {
        ValidatedPriceInfo {
            price: p,
            confidence: conf,
            timestamp: 100,
            validation_score: 100,
            manipulation_risk: 0,
            is_valid: true,
        }
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(
            CollateralPolicy::default(),
            RiskThresholds {
                warning_bps: 9_000,
                liquidation_bps: 9_500,
            },
            PenaltyRateConfig::default(),
        )
        .unwrap()
    }

    fn prices_btc_usdc() -> HashMap<AssetId, ValidatedPriceInfo> {
        let mut prices = HashMap::new();
        prices.insert(AssetId::new("BTC"), price(50_000, 0));
        prices.insert(AssetId::new("USDC"), price(1, 0));
        prices
    }

    #[test]
    fn test_single_asset_ltv() {
        let engine = engine();
        let position = BorrowPosition::single(
            "alice",
            AssetId::new("BTC"),
            2,
            AssetId::new("USDC"),
            55_000,
            100,
        );
        let ltv = engine.compute_ltv(&position, &prices_btc_usdc()).unwrap();
        // 55_000 / 100_000 = 5500 bps
        assert_eq!(ltv, 5_500);
        assert_eq!(engine.risk_tier(ltv), RiskTier::Healthy);
    }

    #[test]
    fn test_multi_asset_ltv_is_value_weighted() {
        let engine = engine();
        let position = BorrowPosition {
            borrower: "bob".into(),
            collateral: vec![(AssetId::new("BTC"), 2), (AssetId::new("USDC"), 10_000)],
            borrowed_amount: 55_000,
            borrowed_asset: AssetId::new("USDC"),
            created_at: 100,
            updated_at: 100,
        };
        let ltv = engine.compute_ltv(&position, &prices_btc_usdc()).unwrap();
        // 55_000 / (100_000 + 10_000) x 10_000 = 5_000 bps
        assert_eq!(ltv, 5_000);
    }

    #[test]
    fn test_conservative_confidence_bounds_raise_ltv() {
        let engine = engine();
        let mut prices = HashMap::new();
        // 1% confidence half-width on both legs
        prices.insert(AssetId::new("BTC"), price(50_000, 500));
        prices.insert(AssetId::new("USDC"), price(100, 1));
        let position = BorrowPosition::single(
            "carol",
            AssetId::new("BTC"),
            2,
            AssetId::new("USDC"),
            550,
            100,
        );
        let ltv = engine.compute_ltv(&position, &prices).unwrap();
        // collateral at 2 x 49_500, debt at 550 x 101
        assert_eq!(ltv, 550 * 101 * 10_000 / 99_000);
        // Strictly above the 5500 bps midpoint figure
        assert!(ltv > 550 * 100 * 10_000 / 100_000);
    }

    #[test]
    fn test_missing_price_is_an_error() {
        let engine = engine();
        let position = BorrowPosition::single(
            "dave",
            AssetId::new("SOL"),
            10,
            AssetId::new("USDC"),
            100,
            100,
        );
        let err = engine.compute_ltv(&position, &prices_btc_usdc()).unwrap_err();
        assert!(matches!(err, RiskError::UnknownAsset(_)));
    }

    #[test]
    fn test_zero_collateral_value_fails_closed() {
        let engine = engine();
        let mut prices = prices_btc_usdc();
        // Confidence swallows the whole price: lower bound 0
        prices.insert(AssetId::new("BTC"), price(50_000, 50_000));
        let position = BorrowPosition::single(
            "erin",
            AssetId::new("BTC"),
            2,
            AssetId::new("USDC"),
            100,
            100,
        );
        assert_eq!(
            engine.compute_ltv(&position, &prices).unwrap_err(),
            RiskError::DivisionByZero
        );
    }

    #[test]
    fn test_tier_bonus_and_global_cap() {
        let mut engine = engine();
        engine.set_asset_class(AssetId::new("BTC"), AssetClass::Blue);
        let position = BorrowPosition::single(
            "frank",
            AssetId::new("BTC"),
            1,
            AssetId::new("USDC"),
            1,
            100,
        );
        // Blue cap 8000 + gold bonus 250
        assert_eq!(
            engine.max_allowed_ltv(&position, BorrowerTier::Gold).unwrap(),
            8_250
        );
        // A cap that would exceed the global ceiling is clipped
        let mut policy = CollateralPolicy::default();
        policy.base_caps.insert(AssetClass::Blue, 9_800);
        engine.set_policy(policy).unwrap();
        assert_eq!(
            engine
                .max_allowed_ltv(&position, BorrowerTier::Platinum)
                .unwrap(),
            9_900
        );
    }

    #[test]
    fn test_multi_asset_cap_takes_most_conservative_class() {
        let mut engine = engine();
        engine.set_asset_class(AssetId::new("BTC"), AssetClass::Blue);
        engine.set_asset_class(AssetId::new("SHIB"), AssetClass::Volatile);
        let position = BorrowPosition {
            borrower: "gina".into(),
            collateral: vec![(AssetId::new("BTC"), 1), (AssetId::new("SHIB"), 1_000_000)],
            borrowed_amount: 1,
            borrowed_asset: AssetId::new("USDC"),
            created_at: 100,
            updated_at: 100,
        };
        // Volatile (6000) loses to Blue (8000)
        assert_eq!(
            engine
                .max_allowed_ltv(&position, BorrowerTier::Standard)
                .unwrap(),
            6_000
        );
    }

    #[test]
    fn test_origination_scenario() {
        let mut engine = engine();
        engine.set_asset_class(AssetId::new("BTC"), AssetClass::Blue);
        let mut policy = CollateralPolicy::default();
        policy.base_caps.insert(AssetClass::Blue, 9_700);
        engine.set_policy(policy).unwrap();

        let mut prices = HashMap::new();
        prices.insert(AssetId::new("BTC"), price(100_000, 0));
        prices.insert(AssetId::new("USDC"), price(1, 0));

        let open = |amount: u64| {
            BorrowPosition::single(
                "hank",
                AssetId::new("BTC"),
                1,
                AssetId::new("USDC"),
                amount,
                100,
            )
        };

        // 9500 bps: under the cap, past the 9000 warning line
        let ltv = engine
            .check_origination(&open(95_000), &prices, BorrowerTier::Standard)
            .unwrap();
        assert_eq!(engine.risk_tier(ltv), RiskTier::Warning);

        // 9600 bps: liquidation threshold is 9500
        let ltv = engine
            .check_origination(&open(96_000), &prices, BorrowerTier::Standard)
            .unwrap();
        assert_eq!(engine.risk_tier(ltv), RiskTier::Liquidatable);

        // 9800 bps: beyond the 9700 cap, rejected outright
        assert_eq!(
            engine.check_origination(&open(98_000), &prices, BorrowerTier::Standard),
            Err(RiskError::ExceedsMaxLtv {
                ltv_bps: 9_800,
                max_allowed_bps: 9_700
            })
        );
    }

    #[test]
    fn test_penalty_rate_steps_with_market_stress() {
        let mut engine = engine();
        let position = BorrowPosition::single(
            "ivy",
            AssetId::new("BTC"),
            1,
            AssetId::new("USDC"),
            1,
            100,
        );
        // Calm market: base rate untouched
        assert_eq!(engine.penalty_rate_bps(&position).unwrap(), 500);

        // High volatility (+50%) and thin liquidity (+25%)
        engine
            .set_market_conditions(MarketConditionFactors {
                volatility_level: 85,
                liquidity_factor: 10,
                price_stability: 20,
                last_updated: 200,
            })
            .unwrap();
        // 500 x 1.5 x 1.25 = 937
        assert_eq!(engine.penalty_rate_bps(&position).unwrap(), 937);

        // Asset multiplier scales before the clamp catches it
        let mut rates = PenaltyRateConfig::default();
        rates
            .asset_multiplier_bps
            .insert(AssetId::new("BTC"), 20_000);
        engine.set_penalty_rates(rates).unwrap();
        // 500 x 2 x 1.5 x 1.25 = 1875, clamped to max 1500
        assert_eq!(engine.penalty_rate_bps(&position).unwrap(), 1_500);
    }

    #[test]
    fn test_check_liquidation_decisions() {
        let engine = engine();
        let mut prices = HashMap::new();
        prices.insert(AssetId::new("BTC"), price(100_000, 0));
        prices.insert(AssetId::new("USDC"), price(1, 0));
        let open = |amount: u64| {
            BorrowPosition::single(
                "jack",
                AssetId::new("BTC"),
                1,
                AssetId::new("USDC"),
                amount,
                100,
            )
        };

        assert_eq!(
            engine.check_liquidation(&open(50_000), &prices).unwrap(),
            LiquidationDecision::None
        );
        assert_eq!(
            engine.check_liquidation(&open(92_000), &prices).unwrap(),
            LiquidationDecision::Warn { ltv_bps: 9_200 }
        );
        match engine.check_liquidation(&open(97_000), &prices).unwrap() {
            LiquidationDecision::Liquidatable {
                ltv_bps,
                penalty_rate_bps,
            } => {
                assert_eq!(ltv_bps, 9_700);
                assert_eq!(penalty_rate_bps, 500);
            }
            other => panic!("expected liquidatable, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(RiskThresholds {
            warning_bps: 9_500,
            liquidation_bps: 9_000,
        }
        .validate()
        .is_err());

        assert!(PenaltyRateConfig {
            min_rate_bps: 2_000,
            max_rate_bps: 1_000,
            ..Default::default()
        }
        .validate()
        .is_err());

        let mut engine = engine();
        let previous = engine.thresholds();
        assert!(engine
            .set_thresholds(RiskThresholds {
                warning_bps: 0,
                liquidation_bps: 9_000,
            })
            .is_err());
        // Rejected update leaves the old config in place
        assert_eq!(engine.thresholds().warning_bps, previous.warning_bps);
    }
}
