//! RiskCore facade
//!
//! Wires the validator, manipulation detector, breaker registry, risk
//! engine and penalty distributor behind one handle. All state lives
//! inside this struct; callers hold a shared reference and supply the
//! current logical timestamp on every call. Mutation of configuration
//! requires the admin capability issued at construction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::breaker::{BreakerStats, CircuitBreakerRegistry, PhaseTransition, ThresholdConfig};
use crate::config::CoreConfig;
use crate::error::{Result, RiskError};
use crate::events::{EventSink, RiskEvent};
use crate::oracle::{
    ManipulationDetector, PriceFeedConfig, PriceValidator, ValidatedPriceInfo,
};
use crate::risk::penalty::{PenaltyDistributionConfig, PenaltyDistributor, PenaltySplit};
use crate::risk::{
    CollateralPolicy, MarketConditionFactors, PenaltyRateConfig, RiskEngine, RiskThresholds,
};
use crate::types::{
    AdminCap, AssetClass, AssetId, BorrowPosition, BorrowerTier, LiquidationDecision,
    OperationKey, OperationKind, RiskTier,
};

/// Operation kinds that depend on a trusted price and trip together when
/// manipulation is flagged for their asset
const PRICE_DEPENDENT_KINDS: [OperationKind; 3] = [
    OperationKind::Borrow,
    OperationKind::Withdraw,
    OperationKind::Liquidate,
];

/// Snapshot of core state for dashboards and health checks
#[derive(Debug, Clone)]
pub struct RiskMetrics {
    pub tracked_assets: usize,
    pub open_breakers: usize,
    pub total_breakers: usize,
    pub global_emergency: bool,
    pub market: MarketConditionFactors,
}

/// The risk-control core. One instance per deployment, shared by handle.
pub struct RiskCore {
    validator: RwLock<PriceValidator>,
    breakers: RwLock<CircuitBreakerRegistry>,
    engine: RwLock<RiskEngine>,
    distributor: RwLock<PenaltyDistributor>,
    global_emergency: AtomicBool,
    admin_cap_id: u64,
    sink: Arc<dyn EventSink>,
}

impl RiskCore {
    /// Build a core from runtime config. `admin_cap_id` is the id the
    /// host minted for its [`AdminCap`]; every admin call must present a
    /// capability carrying it.
    pub fn new(config: &CoreConfig, admin_cap_id: u64, sink: Arc<dyn EventSink>) -> Result<Self> {
        let detector = ManipulationDetector::new(config.detector.to_params());
        detector.params().validate()?;

        let core = Self {
            validator: RwLock::new(PriceValidator::new(detector)),
            breakers: RwLock::new(CircuitBreakerRegistry::new(
                config.breaker.to_thresholds(),
            )?),
            engine: RwLock::new(RiskEngine::new(
                config.risk.to_policy(),
                config.risk.to_thresholds(),
                config.penalty.to_rate_config(),
            )?),
            distributor: RwLock::new(PenaltyDistributor::new(
                config.distribution.to_distribution_config(),
            )?),
            global_emergency: AtomicBool::new(false),
            admin_cap_id,
            sink,
        };
        info!(config = %config.digest(), "risk core initialized");
        Ok(core)
    }

    fn authorize(&self, cap: &AdminCap) -> Result<()> {
        if cap.id() != self.admin_cap_id {
            warn!(presented = cap.id(), "rejected admin call");
            return Err(RiskError::Unauthorized);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Price path
    // ------------------------------------------------------------------

    /// Validate one raw feed sample and return the trusted record.
    ///
    /// Fails closed on staleness, low confidence and manipulation risk
    /// >= 2. Validation failures count against the asset's PriceUpdate
    /// breaker; a flagged manipulation trips every price-dependent
    /// breaker for the asset.
    pub fn get_validated_price(
        &self,
        asset: &AssetId,
        raw_price: u64,
        confidence: u64,
        observed_at: u64,
        now: u64,
    ) -> Result<ValidatedPriceInfo> {
        let price_key = OperationKey::for_asset(OperationKind::PriceUpdate, asset.clone());
        if !self.is_operation_open(&price_key, now) {
            return Err(RiskError::CircuitOpen { key: price_key });
        }

        let outcome = self
            .validator
            .write()
            .validate(asset, raw_price, confidence, observed_at, now);

        match outcome {
            Err(err) => {
                self.sink.emit(&RiskEvent::ValidationFailed {
                    asset: asset.clone(),
                    reason: err.to_string(),
                    timestamp: now,
                });
                let transition = self.breakers.write().record_failure(&price_key, 0, now);
                self.emit_transition(&price_key, transition, now);
                Err(err)
            }
            Ok(info) if info.manipulation_risk >= 2 => {
                let patterns = self
                    .validator
                    .read()
                    .last_verdict(asset)
                    .map(|v| v.triggered.clone())
                    .unwrap_or_default();
                self.sink.emit(&RiskEvent::ManipulationFlagged {
                    asset: asset.clone(),
                    risk_level: info.manipulation_risk,
                    patterns,
                    price: info.price,
                    timestamp: now,
                });
                self.trip_price_dependents(asset, now);
                Err(RiskError::ManipulationDetected {
                    risk_level: info.manipulation_risk,
                })
            }
            Ok(info) => {
                let transition = self.breakers.write().record_success(&price_key, 0, now);
                self.emit_transition(&price_key, transition, now);
                Ok(info)
            }
        }
    }

    /// Last validated info for an asset, including flagged ones
    pub fn cached_price(&self, asset: &AssetId) -> Option<ValidatedPriceInfo> {
        self.validator.read().cached(asset)
    }

    /// Number of points currently held in an asset's price history
    pub fn price_history_len(&self, asset: &AssetId) -> usize {
        self.validator.read().history_len(asset)
    }

    fn trip_price_dependents(&self, asset: &AssetId, now: u64) {
        let mut breakers = self.breakers.write();
        let mut keys: Vec<OperationKey> = PRICE_DEPENDENT_KINDS
            .iter()
            .map(|kind| OperationKey::for_asset(*kind, asset.clone()))
            .collect();
        // Any other live breaker scoped to this asset rides on its price
        // too. The feed's own PriceUpdate breaker stays out: validation
        // must keep running so the history records the full move.
        let extras: Vec<OperationKey> = breakers
            .keys()
            .into_iter()
            .filter(|k| {
                k.asset.as_ref() == Some(asset)
                    && k.kind != OperationKind::PriceUpdate
                    && !keys.contains(k)
            })
            .collect();
        keys.extend(extras);
        for key in keys {
            let transition = breakers.force_open(&key, now);
            if let Some(t) = transition {
                self.sink.emit(&RiskEvent::BreakerTransition {
                    key,
                    from: t.from,
                    to: t.to,
                    timestamp: now,
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Breaker path
    // ------------------------------------------------------------------

    /// Whether an operation class may proceed right now.
    ///
    /// Global emergency overrides every per-key state and never clears
    /// on its own.
    pub fn is_operation_open(&self, key: &OperationKey, now: u64) -> bool {
        if self.global_emergency.load(Ordering::SeqCst) {
            return false;
        }
        self.breakers.write().is_operation_open(key, now)
    }

    /// Record an operation outcome against its breaker
    pub fn record_operation_success(&self, key: &OperationKey, volume: u64, now: u64) {
        let transition = self.breakers.write().record_success(key, volume, now);
        self.emit_transition(key, transition, now);
    }

    pub fn record_operation_failure(&self, key: &OperationKey, volume: u64, now: u64) {
        let transition = self.breakers.write().record_failure(key, volume, now);
        self.emit_transition(key, transition, now);
    }

    fn emit_transition(&self, key: &OperationKey, transition: Option<PhaseTransition>, now: u64) {
        if let Some(t) = transition {
            self.sink.emit(&RiskEvent::BreakerTransition {
                key: key.clone(),
                from: t.from,
                to: t.to,
                timestamp: now,
            });
        }
    }

    // ------------------------------------------------------------------
    // Position path
    // ------------------------------------------------------------------

    /// Collect fresh, unflagged cached prices for every asset a position
    /// touches. Stale or flagged cache entries fail the whole call.
    fn position_prices(
        &self,
        position: &BorrowPosition,
        now: u64,
    ) -> Result<HashMap<AssetId, ValidatedPriceInfo>> {
        let validator = self.validator.read();
        let mut prices = HashMap::new();

        let assets = position
            .collateral
            .iter()
            .map(|(asset, _)| asset)
            .chain(std::iter::once(&position.borrowed_asset));

        for asset in assets {
            if prices.contains_key(asset) {
                continue;
            }
            let feed = validator.feed_config(asset)?;
            let info = validator
                .cached(asset)
                .ok_or_else(|| RiskError::UnknownAsset(asset.to_string()))?;
            let age_secs = now.saturating_sub(info.timestamp);
            if age_secs > feed.max_price_delay_secs {
                return Err(RiskError::StalePrice {
                    age_secs,
                    max_delay_secs: feed.max_price_delay_secs,
                });
            }
            if !info.is_valid {
                return Err(RiskError::ManipulationDetected {
                    risk_level: info.manipulation_risk,
                });
            }
            prices.insert(asset.clone(), info);
        }
        Ok(prices)
    }

    /// Current LTV and health tier for a position
    pub fn compute_position_ltv(
        &self,
        position: &BorrowPosition,
        now: u64,
    ) -> Result<(u64, RiskTier)> {
        let prices = self.position_prices(position, now)?;
        let engine = self.engine.read();
        let ltv = engine.compute_ltv(position, &prices)?;
        Ok((ltv, engine.risk_tier(ltv)))
    }

    /// Origination gate for a new borrow. Rejects when the borrow
    /// breaker is open or the requested LTV exceeds the allowed cap.
    pub fn check_origination(
        &self,
        position: &BorrowPosition,
        tier: BorrowerTier,
        now: u64,
    ) -> Result<u64> {
        let key = OperationKey::for_asset(OperationKind::Borrow, position.borrowed_asset.clone());
        if !self.is_operation_open(&key, now) {
            return Err(RiskError::CircuitOpen { key });
        }
        let prices = self.position_prices(position, now)?;
        self.engine.read().check_origination(position, &prices, tier)
    }

    /// Liquidation decision for an open position. Warning and
    /// liquidatable outcomes are emitted to the event sink.
    pub fn check_liquidation(
        &self,
        position: &BorrowPosition,
        now: u64,
    ) -> Result<LiquidationDecision> {
        let key = OperationKey::for_asset(OperationKind::Liquidate, position.borrowed_asset.clone());
        if !self.is_operation_open(&key, now) {
            return Err(RiskError::CircuitOpen { key });
        }
        let prices = self.position_prices(position, now)?;
        let decision = self.engine.read().check_liquidation(position, &prices)?;

        match decision {
            LiquidationDecision::None => {}
            LiquidationDecision::Warn { ltv_bps } => {
                self.sink.emit(&RiskEvent::LiquidationSignal {
                    borrower: position.borrower.clone(),
                    ltv_bps,
                    tier: RiskTier::Warning,
                    penalty_rate_bps: None,
                    timestamp: now,
                });
            }
            LiquidationDecision::Liquidatable {
                ltv_bps,
                penalty_rate_bps,
            } => {
                self.sink.emit(&RiskEvent::LiquidationSignal {
                    borrower: position.borrower.clone(),
                    ltv_bps,
                    tier: RiskTier::Liquidatable,
                    penalty_rate_bps: Some(penalty_rate_bps),
                    timestamp: now,
                });
            }
        }
        Ok(decision)
    }

    /// Split a liquidation penalty among stakeholders; the shares sum
    /// exactly to `total`. Amounts only - funds move elsewhere.
    pub fn distribute_penalty(&self, total: u64, now: u64) -> Result<PenaltySplit> {
        let split = self.distributor.read().distribute(total)?;
        self.sink.emit(&RiskEvent::PenaltyDistributed {
            total,
            liquidator: split.liquidator,
            platform: split.platform,
            insurance: split.insurance,
            borrower_protection: split.borrower_protection,
            timestamp: now,
        });
        Ok(split)
    }

    // ------------------------------------------------------------------
    // Admin path (capability-gated)
    // ------------------------------------------------------------------

    /// Register an asset: its feed config and collateral class
    pub fn register_asset(
        &self,
        cap: &AdminCap,
        asset: AssetId,
        class: AssetClass,
        feed: PriceFeedConfig,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.validator.write().set_feed_config(asset.clone(), feed)?;
        self.engine.write().set_asset_class(asset.clone(), class);
        self.emit_config_update(&format!("asset:{asset}"), now);
        Ok(())
    }

    pub fn update_feed_config(
        &self,
        cap: &AdminCap,
        asset: AssetId,
        feed: PriceFeedConfig,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.validator.write().set_feed_config(asset.clone(), feed)?;
        self.emit_config_update(&format!("feed:{asset}"), now);
        Ok(())
    }

    pub fn update_threshold_config(
        &self,
        cap: &AdminCap,
        key: OperationKey,
        config: ThresholdConfig,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.breakers.write().set_thresholds(key.clone(), config)?;
        self.emit_config_update(&format!("thresholds:{key}"), now);
        Ok(())
    }

    pub fn update_collateral_policy(
        &self,
        cap: &AdminCap,
        policy: CollateralPolicy,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.engine.write().set_policy(policy)?;
        self.emit_config_update("collateral_policy", now);
        Ok(())
    }

    pub fn update_risk_thresholds(
        &self,
        cap: &AdminCap,
        thresholds: RiskThresholds,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.engine.write().set_thresholds(thresholds)?;
        self.emit_config_update("risk_thresholds", now);
        Ok(())
    }

    pub fn update_penalty_rates(
        &self,
        cap: &AdminCap,
        rates: PenaltyRateConfig,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.engine.write().set_penalty_rates(rates)?;
        self.emit_config_update("penalty_rates", now);
        Ok(())
    }

    pub fn update_distribution_config(
        &self,
        cap: &AdminCap,
        config: PenaltyDistributionConfig,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.distributor.write().set_config(config)?;
        self.emit_config_update("distribution", now);
        Ok(())
    }

    pub fn update_market_conditions(
        &self,
        cap: &AdminCap,
        factors: MarketConditionFactors,
        now: u64,
    ) -> Result<()> {
        self.authorize(cap)?;
        self.engine.write().set_market_conditions(factors)?;
        self.emit_config_update("market_conditions", now);
        Ok(())
    }

    /// Force every breaker to behave as Open, or clear that state.
    /// Never recovers automatically.
    pub fn set_global_emergency(&self, cap: &AdminCap, active: bool, now: u64) -> Result<()> {
        self.authorize(cap)?;
        let was = self.global_emergency.swap(active, Ordering::SeqCst);
        if was != active {
            if active {
                warn!("GLOBAL EMERGENCY ACTIVATED - all operations halted");
            } else {
                info!("global emergency cleared");
            }
            self.sink.emit(&RiskEvent::GlobalEmergency {
                active,
                timestamp: now,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn breaker_stats(&self, key: &OperationKey) -> Option<BreakerStats> {
        self.breakers.read().stats(key)
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        let breakers = self.breakers.read();
        let stats = breakers.all_stats();
        let open = stats
            .iter()
            .filter(|s| s.phase == crate::breaker::BreakerPhase::Open)
            .count();
        RiskMetrics {
            tracked_assets: self.validator.read().tracked_assets(),
            open_breakers: open,
            total_breakers: stats.len(),
            global_emergency: self.global_emergency.load(Ordering::SeqCst),
            market: self.engine.read().market_conditions(),
        }
    }

    fn emit_config_update(&self, scope: &str, now: u64) {
        self.sink.emit(&RiskEvent::ConfigUpdated {
            scope: scope.to_string(),
            timestamp: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullSink;

    const CAP_ID: u64 = 7;

    fn cap() -> AdminCap {
        AdminCap::new(CAP_ID)
    }

    fn feed() -> PriceFeedConfig {
        PriceFeedConfig {
            feed_id: "BTC/USD".into(),
            exponent: 0,
            heartbeat_secs: 60,
            max_deviation_bps: 1_000,
            max_confidence_ratio_bps: 200,
            max_price_delay_secs: 120,
        }
    }

    fn core() -> RiskCore {
        let config = CoreConfig::load().unwrap();
        let core = RiskCore::new(&config, CAP_ID, Arc::new(NullSink)).unwrap();
        core.register_asset(&cap(), AssetId::new("BTC"), AssetClass::Blue, feed(), 0)
            .unwrap();
        core.register_asset(
            &cap(),
            AssetId::new("USDC"),
            AssetClass::Stable,
            PriceFeedConfig {
                feed_id: "USDC/USD".into(),
                ..feed()
            },
            0,
        )
        .unwrap();
        core
    }

    fn seed_prices(core: &RiskCore, now: u64) {
        core.get_validated_price(&AssetId::new("BTC"), 50_000, 0, now, now)
            .unwrap();
        core.get_validated_price(&AssetId::new("USDC"), 1, 0, now, now)
            .unwrap();
    }

    #[test]
    fn test_wrong_capability_rejected() {
        let core = core();
        let err = core
            .set_global_emergency(&AdminCap::new(999), true, 10)
            .unwrap_err();
        assert_eq!(err, RiskError::Unauthorized);
        // State untouched
        assert!(!core.risk_metrics().global_emergency);
    }

    #[test]
    fn test_global_emergency_overrides_everything() {
        let core = core();
        let key = OperationKey::for_asset(OperationKind::Borrow, AssetId::new("BTC"));
        assert!(core.is_operation_open(&key, 10));

        core.set_global_emergency(&cap(), true, 11).unwrap();
        assert!(!core.is_operation_open(&key, 12));
        // Time passing does not clear it
        assert!(!core.is_operation_open(&key, 1_000_000));

        core.set_global_emergency(&cap(), false, 1_000_001).unwrap();
        assert!(core.is_operation_open(&key, 1_000_002));
    }

    #[test]
    fn test_manipulation_trips_dependent_breakers() {
        let core = core();
        let asset = AssetId::new("BTC");
        core.get_validated_price(&asset, 100_000, 0, 10, 10).unwrap();

        // +30% spike against a 10% budget
        let err = core
            .get_validated_price(&asset, 130_000, 0, 11, 11)
            .unwrap_err();
        assert_eq!(err, RiskError::ManipulationDetected { risk_level: 3 });

        let borrow = OperationKey::for_asset(OperationKind::Borrow, asset.clone());
        let withdraw = OperationKey::for_asset(OperationKind::Withdraw, asset.clone());
        let liquidate = OperationKey::for_asset(OperationKind::Liquidate, asset.clone());
        assert!(!core.is_operation_open(&borrow, 12));
        assert!(!core.is_operation_open(&withdraw, 12));
        assert!(!core.is_operation_open(&liquidate, 12));
        // Unrelated asset unaffected
        let usdc_borrow = OperationKey::for_asset(OperationKind::Borrow, AssetId::new("USDC"));
        assert!(core.is_operation_open(&usdc_borrow, 12));
    }

    #[test]
    fn test_ltv_and_origination_flow() {
        let core = core();
        seed_prices(&core, 100);

        let position = BorrowPosition {
            borrower: "alice".into(),
            collateral: vec![(AssetId::new("BTC"), 2), (AssetId::new("USDC"), 10_000)],
            borrowed_amount: 55_000,
            borrowed_asset: AssetId::new("USDC"),
            created_at: 100,
            updated_at: 100,
        };
        let (ltv, tier) = core.compute_position_ltv(&position, 100).unwrap();
        assert_eq!(ltv, 5_000);
        assert_eq!(tier, RiskTier::Healthy);
        assert_eq!(core.check_origination(&position, BorrowerTier::Standard, 100), Ok(5_000));
    }

    #[test]
    fn test_stale_cache_blocks_position_math() {
        let core = core();
        seed_prices(&core, 100);
        let position = BorrowPosition::single(
            "bob",
            AssetId::new("BTC"),
            1,
            AssetId::new("USDC"),
            10_000,
            100,
        );
        // 121s later the cached price has aged out
        let err = core.compute_position_ltv(&position, 221).unwrap_err();
        assert!(matches!(err, RiskError::StalePrice { .. }));
    }

    #[test]
    fn test_liquidation_and_penalty_flow() {
        let core = core();
        seed_prices(&core, 100);
        let position = BorrowPosition::single(
            "carol",
            AssetId::new("BTC"),
            2,
            AssetId::new("USDC"),
            97_000,
            100,
        );
        match core.check_liquidation(&position, 100).unwrap() {
            LiquidationDecision::Liquidatable {
                ltv_bps,
                penalty_rate_bps,
            } => {
                assert_eq!(ltv_bps, 9_700);
                assert_eq!(penalty_rate_bps, 500);
            }
            other => panic!("expected liquidatable, got {other:?}"),
        }

        let split = core.distribute_penalty(225, 101).unwrap();
        assert_eq!(split.total(), 225);
        assert_eq!(split.liquidator, 112);
    }

    #[test]
    fn test_rejected_update_leaves_previous_config() {
        let core = core();
        let bad = PenaltyDistributionConfig {
            liquidator_share_bps: 9_000,
            platform_share_bps: 2_000,
            insurance_share_bps: 0,
            borrower_protection: false,
        };
        assert!(core
            .update_distribution_config(&cap(), bad, 10)
            .is_err());
        // Old 5000/3000/1500 split still in force
        let split = core.distribute_penalty(10_000, 11).unwrap();
        assert_eq!(split.liquidator, 5_000);
    }
}
