//! Circuit breaker registry
//!
//! A keyed set of protective state machines, one per operation class
//! (optionally crossed with an asset). Breakers trip on failure bursts,
//! volume surges or detected price manipulation, then recover through a
//! timed HalfOpen probe.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, RiskError};
use crate::types::OperationKey;

/// Breaker phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerPhase {
    /// Normal operation
    Closed,
    /// Tripped - operations blocked until recovery timeout elapses
    Open,
    /// Probing - one operation allowed through to test recovery
    HalfOpen,
}

impl std::fmt::Display for BreakerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerPhase::Closed => write!(f, "CLOSED"),
            BreakerPhase::Open => write!(f, "OPEN"),
            BreakerPhase::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Trip/recovery thresholds for one operation key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Failures inside the window beyond which the breaker opens
    pub failure_threshold: u32,
    /// Rolling window for failure and volume accounting
    pub time_window_secs: u64,
    /// Time in Open before a HalfOpen probe is allowed
    pub recovery_timeout_secs: u64,
    /// In-window operation volume beyond which the breaker opens
    pub volume_threshold: u64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            time_window_secs: 300,
            recovery_timeout_secs: 600,
            volume_threshold: 1_000_000_000,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(RiskError::InvalidConfig(
                "failure_threshold must be positive".into(),
            ));
        }
        if self.time_window_secs == 0 || self.recovery_timeout_secs == 0 {
            return Err(RiskError::InvalidConfig(
                "time_window_secs and recovery_timeout_secs must be positive".into(),
            ));
        }
        if self.volume_threshold == 0 {
            return Err(RiskError::InvalidConfig(
                "volume_threshold must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Mutable state of one breaker. Only the registry touches this.
#[derive(Debug, Clone)]
struct CircuitBreakerState {
    phase: BreakerPhase,
    failure_count: u32,
    window_volume: u64,
    window_started_at: u64,
    last_failure_time: Option<u64>,
    last_success_time: Option<u64>,
    phase_change_time: u64,
}

impl CircuitBreakerState {
    fn new(now: u64) -> Self {
        Self {
            phase: BreakerPhase::Closed,
            failure_count: 0,
            window_volume: 0,
            window_started_at: now,
            last_failure_time: None,
            last_success_time: None,
            phase_change_time: now,
        }
    }

    /// Reset rolling counters once the accounting window has passed
    fn roll_window(&mut self, window_secs: u64, now: u64) {
        if now.saturating_sub(self.window_started_at) > window_secs {
            self.failure_count = 0;
            self.window_volume = 0;
            self.window_started_at = now;
        }
    }
}

/// Read-only snapshot of one breaker for metrics/diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub key: OperationKey,
    pub phase: BreakerPhase,
    pub failure_count: u32,
    pub window_volume: u64,
    pub last_failure_time: Option<u64>,
    pub last_success_time: Option<u64>,
    pub phase_change_time: u64,
}

/// A phase change observed while recording an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: BreakerPhase,
    pub to: BreakerPhase,
}

/// Keyed registry of breakers plus per-key threshold configs
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<OperationKey, CircuitBreakerState>,
    thresholds: HashMap<OperationKey, ThresholdConfig>,
    defaults: ThresholdConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(defaults: ThresholdConfig) -> Result<Self> {
        defaults.validate()?;
        Ok(Self {
            breakers: HashMap::new(),
            thresholds: HashMap::new(),
            defaults,
        })
    }

    /// Install thresholds for one key. Validated before being applied.
    pub fn set_thresholds(&mut self, key: OperationKey, config: ThresholdConfig) -> Result<()> {
        config.validate()?;
        self.thresholds.insert(key, config);
        Ok(())
    }

    fn thresholds_for(&self, key: &OperationKey) -> &ThresholdConfig {
        self.thresholds.get(key).unwrap_or(&self.defaults)
    }

    /// Whether the operation may proceed. HalfOpen admits the probe.
    ///
    /// Advances Open->HalfOpen lazily when the recovery timeout elapsed;
    /// there is no background clock.
    pub fn is_operation_open(&mut self, key: &OperationKey, now: u64) -> bool {
        let recovery = self.thresholds_for(key).recovery_timeout_secs;
        match self.breakers.get_mut(key) {
            None => true,
            Some(state) => {
                advance_recovery(state, key, recovery, now);
                matches!(state.phase, BreakerPhase::Closed | BreakerPhase::HalfOpen)
            }
        }
    }

    /// Current phase without the probe interpretation
    pub fn phase(&mut self, key: &OperationKey, now: u64) -> BreakerPhase {
        let recovery = self.thresholds_for(key).recovery_timeout_secs;
        match self.breakers.get_mut(key) {
            None => BreakerPhase::Closed,
            Some(state) => {
                advance_recovery(state, key, recovery, now);
                state.phase
            }
        }
    }

    /// Record a failed operation. Returns any phase transition it caused.
    pub fn record_failure(
        &mut self,
        key: &OperationKey,
        volume: u64,
        now: u64,
    ) -> Option<PhaseTransition> {
        let config = self.thresholds.get(key).unwrap_or(&self.defaults).clone();
        let state = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| CircuitBreakerState::new(now));
        advance_recovery(state, key, config.recovery_timeout_secs, now);
        state.last_failure_time = Some(now);

        match state.phase {
            BreakerPhase::Closed => {
                state.roll_window(config.time_window_secs, now);
                // Counter saturation only ever biases toward tripping
                state.failure_count = state.failure_count.saturating_add(1);
                state.window_volume = state.window_volume.saturating_add(volume);
                if state.failure_count > config.failure_threshold
                    || state.window_volume > config.volume_threshold
                {
                    transition(state, key, BreakerPhase::Open, now);
                    return Some(PhaseTransition {
                        from: BreakerPhase::Closed,
                        to: BreakerPhase::Open,
                    });
                }
                None
            }
            BreakerPhase::HalfOpen => {
                // Failed probe reopens immediately
                transition(state, key, BreakerPhase::Open, now);
                Some(PhaseTransition {
                    from: BreakerPhase::HalfOpen,
                    to: BreakerPhase::Open,
                })
            }
            BreakerPhase::Open => None,
        }
    }

    /// Record a successful operation. Returns any phase transition.
    pub fn record_success(
        &mut self,
        key: &OperationKey,
        volume: u64,
        now: u64,
    ) -> Option<PhaseTransition> {
        let config = self.thresholds.get(key).unwrap_or(&self.defaults).clone();
        let state = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| CircuitBreakerState::new(now));
        advance_recovery(state, key, config.recovery_timeout_secs, now);
        state.last_success_time = Some(now);

        match state.phase {
            BreakerPhase::Closed => {
                state.roll_window(config.time_window_secs, now);
                state.window_volume = state.window_volume.saturating_add(volume);
                if state.window_volume > config.volume_threshold {
                    transition(state, key, BreakerPhase::Open, now);
                    return Some(PhaseTransition {
                        from: BreakerPhase::Closed,
                        to: BreakerPhase::Open,
                    });
                }
                None
            }
            BreakerPhase::HalfOpen => {
                let mut fresh = CircuitBreakerState::new(now);
                fresh.last_success_time = Some(now);
                *state = fresh;
                info!(key = %key, "breaker recovered, probe succeeded");
                Some(PhaseTransition {
                    from: BreakerPhase::HalfOpen,
                    to: BreakerPhase::Closed,
                })
            }
            BreakerPhase::Open => None,
        }
    }

    /// Force a breaker Open (manipulation report or admin action)
    pub fn force_open(&mut self, key: &OperationKey, now: u64) -> Option<PhaseTransition> {
        let state = self
            .breakers
            .entry(key.clone())
            .or_insert_with(|| CircuitBreakerState::new(now));
        if state.phase == BreakerPhase::Open {
            return None;
        }
        let from = state.phase;
        transition(state, key, BreakerPhase::Open, now);
        Some(PhaseTransition {
            from,
            to: BreakerPhase::Open,
        })
    }

    pub fn stats(&self, key: &OperationKey) -> Option<BreakerStats> {
        self.breakers.get(key).map(|state| BreakerStats {
            key: key.clone(),
            phase: state.phase,
            failure_count: state.failure_count,
            window_volume: state.window_volume,
            last_failure_time: state.last_failure_time,
            last_success_time: state.last_success_time,
            phase_change_time: state.phase_change_time,
        })
    }

    pub fn all_stats(&self) -> Vec<BreakerStats> {
        self.breakers
            .keys()
            .filter_map(|key| self.stats(key))
            .collect()
    }

    /// Keys currently tracked (used to trip every breaker scoped to an asset)
    pub fn keys(&self) -> Vec<OperationKey> {
        self.breakers.keys().cloned().collect()
    }
}

fn advance_recovery(state: &mut CircuitBreakerState, key: &OperationKey, recovery: u64, now: u64) {
    if state.phase == BreakerPhase::Open
        && now.saturating_sub(state.phase_change_time) >= recovery
    {
        transition(state, key, BreakerPhase::HalfOpen, now);
    }
}

fn transition(state: &mut CircuitBreakerState, key: &OperationKey, to: BreakerPhase, now: u64) {
    let from = state.phase;
    state.phase = to;
    state.phase_change_time = now;
    match to {
        BreakerPhase::Open => warn!(key = %key, %from, "circuit breaker opened"),
        _ => info!(key = %key, %from, %to, "circuit breaker transition"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetId, OperationKind};

    fn key() -> OperationKey {
        OperationKey::for_asset(OperationKind::Borrow, AssetId::new("BTC"))
    }

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(ThresholdConfig {
            failure_threshold: 3,
            time_window_secs: 60,
            recovery_timeout_secs: 120,
            volume_threshold: 10_000,
        })
        .unwrap()
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        assert!(CircuitBreakerRegistry::new(ThresholdConfig {
            failure_threshold: 0,
            ..Default::default()
        })
        .is_err());
        let mut reg = registry();
        assert!(reg
            .set_thresholds(
                key(),
                ThresholdConfig {
                    time_window_secs: 0,
                    ..Default::default()
                }
            )
            .is_err());
    }

    #[test]
    fn test_opens_only_past_failure_threshold() {
        let mut reg = registry();
        let k = key();
        // Exactly at threshold: still closed
        for i in 0..3 {
            assert_eq!(reg.record_failure(&k, 0, 10 + i), None);
        }
        assert!(reg.is_operation_open(&k, 14));
        // One past the threshold trips it
        let t = reg.record_failure(&k, 0, 15).unwrap();
        assert_eq!(t.to, BreakerPhase::Open);
        assert!(!reg.is_operation_open(&k, 16));
    }

    #[test]
    fn test_window_expiry_resets_failure_count() {
        let mut reg = registry();
        let k = key();
        for i in 0..3 {
            reg.record_failure(&k, 0, 10 + i);
        }
        // Window (60s) passes; counters reset before the next failure
        assert_eq!(reg.record_failure(&k, 0, 100), None);
        assert!(reg.is_operation_open(&k, 100));
    }

    #[test]
    fn test_volume_surge_trips_even_on_success() {
        let mut reg = registry();
        let k = key();
        reg.record_success(&k, 6_000, 10);
        let t = reg.record_success(&k, 6_000, 11).unwrap();
        assert_eq!(t.to, BreakerPhase::Open);
        assert!(!reg.is_operation_open(&k, 12));
    }

    #[test]
    fn test_recovery_probe_cycle() {
        let mut reg = registry();
        let k = key();
        for i in 0..4 {
            reg.record_failure(&k, 0, 10 + i);
        }
        assert_eq!(reg.phase(&k, 20), BreakerPhase::Open);
        // Before the recovery timeout the breaker stays closed to traffic
        assert!(!reg.is_operation_open(&k, 130));
        // After recovery_timeout (120s from trip at t=13) the probe opens
        assert!(reg.is_operation_open(&k, 140));
        assert_eq!(reg.phase(&k, 140), BreakerPhase::HalfOpen);
        // Failed probe goes straight back to Open with a fresh clock
        let t = reg.record_failure(&k, 0, 141).unwrap();
        assert_eq!(t.from, BreakerPhase::HalfOpen);
        assert_eq!(t.to, BreakerPhase::Open);
        assert!(!reg.is_operation_open(&k, 200));
        // Second recovery, successful probe closes it
        assert!(reg.is_operation_open(&k, 261));
        let t = reg.record_success(&k, 0, 262).unwrap();
        assert_eq!(t.to, BreakerPhase::Closed);
        assert_eq!(reg.phase(&k, 263), BreakerPhase::Closed);
        assert_eq!(reg.stats(&k).unwrap().failure_count, 0);
    }

    #[test]
    fn test_force_open_is_idempotent() {
        let mut reg = registry();
        let k = key();
        let t = reg.force_open(&k, 10).unwrap();
        assert_eq!(t.from, BreakerPhase::Closed);
        assert_eq!(reg.force_open(&k, 11), None);
        assert!(!reg.is_operation_open(&k, 12));
    }

    #[test]
    fn test_unknown_key_defaults_closed() {
        let mut reg = registry();
        assert!(reg.is_operation_open(&key(), 10));
        assert_eq!(reg.phase(&key(), 10), BreakerPhase::Closed);
        assert!(reg.stats(&key()).is_none());
    }
}
