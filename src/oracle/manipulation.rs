//! Manipulation detector
//!
//! Scans the per-asset price history for adversarial patterns. Four
//! independent checks, any one of which can raise the risk level:
//! single-step spikes, slow cumulative drift, confidence/price mismatch,
//! and pump/dump oscillation.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::math::{relative_change_bps, safe_mul_div, BPS_DENOMINATOR};
use crate::oracle::{PriceFeedConfig, PriceHistory, PricePoint};

/// Which adversarial pattern fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    Spike,
    CumulativeDrift,
    ConfidenceMismatch,
    Oscillation,
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternKind::Spike => write!(f, "SPIKE"),
            PatternKind::CumulativeDrift => write!(f, "CUMULATIVE_DRIFT"),
            PatternKind::ConfidenceMismatch => write!(f, "CONFIDENCE_MISMATCH"),
            PatternKind::Oscillation => write!(f, "OSCILLATION"),
        }
    }
}

impl PatternKind {
    /// Severity contributed when this pattern fires alone
    fn severity(&self) -> u8 {
        match self {
            PatternKind::Spike => 2,
            PatternKind::CumulativeDrift => 2,
            PatternKind::ConfidenceMismatch => 1,
            PatternKind::Oscillation => 3,
        }
    }
}

/// Detector verdict for one price update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManipulationVerdict {
    pub is_manipulation: bool,
    /// 0-3, max severity among triggered patterns
    pub risk_level: u8,
    pub triggered: Vec<PatternKind>,
}

impl ManipulationVerdict {
    fn clean() -> Self {
        Self {
            is_manipulation: false,
            risk_level: 0,
            triggered: Vec::new(),
        }
    }
}

/// Tunable detector thresholds.
///
/// The spike threshold always reuses each feed's `max_deviation_bps`; the
/// remaining knobs are global with conservative defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Number of trailing steps summed by the cumulative-drift check
    pub drift_window: usize,
    /// Drift threshold as a factor of the feed deviation, in bps of the
    /// deviation (15_000 = 1.5x)
    pub drift_factor_bps: u64,
    /// Minimum confidence-ratio improvement that counts as suspicious
    pub mismatch_confidence_gain_bps: u64,
    /// Number of trailing points scanned for a pump/dump round trip
    pub oscillation_window: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            drift_window: 10,
            drift_factor_bps: 15_000,
            mismatch_confidence_gain_bps: 50,
            oscillation_window: 6,
        }
    }
}

impl DetectorParams {
    pub fn validate(&self) -> Result<()> {
        if self.drift_window < 2 {
            return Err(crate::error::RiskError::InvalidConfig(
                "drift_window must be at least 2".into(),
            ));
        }
        if self.oscillation_window < 3 {
            return Err(crate::error::RiskError::InvalidConfig(
                "oscillation_window must be at least 3".into(),
            ));
        }
        if self.drift_factor_bps == 0 {
            return Err(crate::error::RiskError::InvalidConfig(
                "drift_factor_bps must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Stateless analyzer over a single asset's history
#[derive(Debug, Clone)]
pub struct ManipulationDetector {
    params: DetectorParams,
}

impl ManipulationDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Analyze a candidate point against the asset's accepted history.
    ///
    /// The candidate is not yet in the history, so a failed analysis
    /// leaves no trace. History and candidate both passed staleness and
    /// confidence validation, so prices are nonzero.
    pub fn analyze(
        &self,
        asset: &str,
        history: &PriceHistory,
        candidate: &PricePoint,
        feed: &PriceFeedConfig,
    ) -> Result<ManipulationVerdict> {
        let mut points: Vec<&PricePoint> = history.iter().collect();
        points.push(candidate);
        if points.len() < 2 {
            return Ok(ManipulationVerdict::clean());
        }

        let newest = points[points.len() - 1];
        let prev = points[points.len() - 2];

        let mut triggered = Vec::new();

        if let Some(kind) = self.check_spike(prev, newest, feed)? {
            triggered.push(kind);
        }
        if self.check_drift(&points, feed)? {
            triggered.push(PatternKind::CumulativeDrift);
        }
        if self.check_confidence_mismatch(prev, newest, feed)? {
            triggered.push(PatternKind::ConfidenceMismatch);
        }
        if self.check_oscillation(&points, feed)? {
            triggered.push(PatternKind::Oscillation);
        }

        if triggered.is_empty() {
            return Ok(ManipulationVerdict::clean());
        }

        // Spike severity escalates to 3 past twice the feed deviation
        let mut risk_level = triggered.iter().map(|k| k.severity()).max().unwrap_or(0);
        if triggered.contains(&PatternKind::Spike) {
            let change = relative_change_bps(prev.price, newest.price)?;
            if change >= feed.max_deviation_bps.saturating_mul(2) {
                risk_level = 3;
            }
        }

        let verdict = ManipulationVerdict {
            is_manipulation: risk_level >= 2,
            risk_level,
            triggered,
        };

        warn!(
            asset = asset,
            risk_level = verdict.risk_level,
            patterns = ?verdict.triggered,
            price = newest.price,
            "price manipulation pattern detected"
        );

        Ok(verdict)
    }

    /// Single-step relative change beyond the feed's deviation threshold
    fn check_spike(
        &self,
        prev: &PricePoint,
        newest: &PricePoint,
        feed: &PriceFeedConfig,
    ) -> Result<Option<PatternKind>> {
        let change = relative_change_bps(prev.price, newest.price)?;
        if change > feed.max_deviation_bps {
            return Ok(Some(PatternKind::Spike));
        }
        Ok(None)
    }

    /// Sum of signed per-step changes over the drift window.
    ///
    /// Catches slow manipulation where each step stays under the spike
    /// threshold but the walk is consistently one-directional.
    fn check_drift(&self, points: &[&PricePoint], feed: &PriceFeedConfig) -> Result<bool> {
        if points.len() < 3 {
            return Ok(false);
        }
        let window = self.params.drift_window.min(points.len() - 1);
        let tail = &points[points.len() - (window + 1)..];

        let mut drift_bps: i128 = 0;
        for pair in tail.windows(2) {
            let step = relative_change_bps(pair[0].price, pair[1].price)? as i128;
            if pair[1].price >= pair[0].price {
                drift_bps += step;
            } else {
                drift_bps -= step;
            }
        }

        let threshold =
            safe_mul_div(feed.max_deviation_bps, self.params.drift_factor_bps, BPS_DENOMINATOR)?;
        Ok(drift_bps.unsigned_abs() > threshold as u128)
    }

    /// Confidence tightening while the price jumps.
    ///
    /// Genuine market stress widens confidence intervals; an interval that
    /// narrows through a sharp move is statistically inconsistent.
    fn check_confidence_mismatch(
        &self,
        prev: &PricePoint,
        newest: &PricePoint,
        feed: &PriceFeedConfig,
    ) -> Result<bool> {
        let prev_ratio = safe_mul_div(prev.confidence, BPS_DENOMINATOR, prev.price)?;
        let new_ratio = safe_mul_div(newest.confidence, BPS_DENOMINATOR, newest.price)?;
        if new_ratio >= prev_ratio {
            return Ok(false);
        }
        let gain = prev_ratio - new_ratio;
        if gain < self.params.mismatch_confidence_gain_bps {
            return Ok(false);
        }
        let move_bps = relative_change_bps(prev.price, newest.price)?;
        Ok(move_bps >= feed.max_deviation_bps / 2)
    }

    /// Pump/dump round trip: a rise of at least the deviation threshold
    /// followed by a reversal below the pre-rise level, all inside the
    /// oscillation window.
    fn check_oscillation(&self, points: &[&PricePoint], feed: &PriceFeedConfig) -> Result<bool> {
        if points.len() < 3 {
            return Ok(false);
        }
        let window = self.params.oscillation_window.min(points.len());
        let tail = &points[points.len() - window..];
        let newest = tail[tail.len() - 1];

        for (i, base) in tail[..tail.len() - 1].iter().enumerate() {
            if newest.price >= base.price {
                continue;
            }
            for peak in &tail[i + 1..tail.len() - 1] {
                if peak.price <= base.price {
                    continue;
                }
                let rise = relative_change_bps(base.price, peak.price)?;
                if rise >= feed.max_deviation_bps {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
