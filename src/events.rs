//! Structured event emission
//!
//! Every validation failure, breaker transition, manipulation flag and
//! liquidation/penalty decision is reported through an [`EventSink`].
//! The default sink logs via `tracing`; the journal sink in
//! [`crate::persistence`] appends CSV records. Hosts can inject their own.

use serde::Serialize;
use tracing::{info, warn};

use crate::breaker::BreakerPhase;
use crate::oracle::PatternKind;
use crate::types::{AssetId, OperationKey, RiskTier};

/// Everything the risk core reports to the outside world
#[derive(Debug, Clone, Serialize)]
pub enum RiskEvent {
    ValidationFailed {
        asset: AssetId,
        reason: String,
        timestamp: u64,
    },
    ManipulationFlagged {
        asset: AssetId,
        risk_level: u8,
        patterns: Vec<PatternKind>,
        price: u64,
        timestamp: u64,
    },
    BreakerTransition {
        key: OperationKey,
        from: BreakerPhase,
        to: BreakerPhase,
        timestamp: u64,
    },
    GlobalEmergency {
        active: bool,
        timestamp: u64,
    },
    LiquidationSignal {
        borrower: String,
        ltv_bps: u64,
        tier: RiskTier,
        penalty_rate_bps: Option<u64>,
        timestamp: u64,
    },
    PenaltyDistributed {
        total: u64,
        liquidator: u64,
        platform: u64,
        insurance: u64,
        borrower_protection: u64,
        timestamp: u64,
    },
    ConfigUpdated {
        scope: String,
        timestamp: u64,
    },
}

impl RiskEvent {
    /// Stable wire form for host-side sinks and log shippers
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sink seam for event consumers.
///
/// Emission is infallible from the core's perspective; sinks handle and
/// log their own failures so a broken journal can never abort a
/// validation or liquidation path.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &RiskEvent);
}

/// Default sink: structured tracing output
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &RiskEvent) {
        match event {
            RiskEvent::ValidationFailed {
                asset,
                reason,
                timestamp,
            } => warn!(asset = %asset, reason = %reason, timestamp, "price validation failed"),
            RiskEvent::ManipulationFlagged {
                asset,
                risk_level,
                patterns,
                price,
                timestamp,
            } => warn!(
                asset = %asset,
                risk_level,
                ?patterns,
                price,
                timestamp,
                "manipulation flagged"
            ),
            RiskEvent::BreakerTransition {
                key,
                from,
                to,
                timestamp,
            } => info!(key = %key, %from, %to, timestamp, "breaker transition"),
            RiskEvent::GlobalEmergency { active, timestamp } => {
                warn!(active, timestamp, "global emergency toggled")
            }
            RiskEvent::LiquidationSignal {
                borrower,
                ltv_bps,
                tier,
                penalty_rate_bps,
                timestamp,
            } => info!(
                borrower = %borrower,
                ltv_bps,
                tier = %tier,
                ?penalty_rate_bps,
                timestamp,
                "liquidation signal"
            ),
            RiskEvent::PenaltyDistributed {
                total,
                liquidator,
                platform,
                insurance,
                borrower_protection,
                timestamp,
            } => info!(
                total,
                liquidator,
                platform,
                insurance,
                borrower_protection,
                timestamp,
                "penalty distributed"
            ),
            RiskEvent::ConfigUpdated { scope, timestamp } => {
                info!(scope = %scope, timestamp, "config updated")
            }
        }
    }
}

/// Discards everything; useful in tests and benchmarks
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &RiskEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_sink_observes_emission() {
        let mut sink = MockEventSink::new();
        sink.expect_emit()
            .withf(|event| matches!(event, RiskEvent::GlobalEmergency { active: true, .. }))
            .times(1)
            .return_const(());

        sink.emit(&RiskEvent::GlobalEmergency {
            active: true,
            timestamp: 42,
        });
    }

    #[test]
    fn test_events_serialize_for_journal() {
        let event = RiskEvent::BreakerTransition {
            key: OperationKey::global(crate::types::OperationKind::Borrow),
            from: BreakerPhase::Closed,
            to: BreakerPhase::Open,
            timestamp: 7,
        };
        let json = event.to_json();
        assert!(json.contains("BreakerTransition"));
        assert!(json.contains("Open"));
    }
}
