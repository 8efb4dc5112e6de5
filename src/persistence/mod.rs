//! CSV Event Journal
//!
//! Append-only storage of risk events for audits and incident review.
//! One file per event class per day; headers written once, every record
//! flushed so a crash never loses acknowledged events.

use anyhow::{Context, Result};
use chrono::Utc;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::events::{EventSink, RiskEvent};

/// Validation failure / manipulation flag row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub timestamp: u64,
    pub asset: String,
    pub reason: String,
    pub risk_level: u8,
    pub price: Option<u64>,
}

/// Breaker transition / global emergency row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerRecord {
    pub timestamp: u64,
    pub key: String,
    pub from_phase: String,
    pub to_phase: String,
}

/// Liquidation signal / penalty split row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub timestamp: u64,
    pub borrower: String,
    pub ltv_bps: u64,
    pub tier: String,
    pub penalty_rate_bps: Option<u64>,
    pub penalty_total: Option<u64>,
}

/// CSV-backed event sink
pub struct EventJournal {
    data_dir: PathBuf,
    validation_writer: Mutex<csv::Writer<std::fs::File>>,
    breaker_writer: Mutex<csv::Writer<std::fs::File>>,
    liquidation_writer: Mutex<csv::Writer<std::fs::File>>,
}

impl EventJournal {
    /// Create a new journal rooted at `data_dir`
    pub fn new(data_dir: &str) -> Result<Self> {
        let data_dir = PathBuf::from(data_dir);

        fs::create_dir_all(&data_dir).context("Failed to create journal directory")?;
        fs::create_dir_all(data_dir.join("validations"))?;
        fs::create_dir_all(data_dir.join("breakers"))?;
        fs::create_dir_all(data_dir.join("liquidations"))?;

        let today = Utc::now().format("%Y-%m-%d");

        let validation_writer = Self::create_writer(
            &data_dir.join("validations"),
            &format!("validations_{}.csv", today),
        )?;
        let breaker_writer = Self::create_writer(
            &data_dir.join("breakers"),
            &format!("breakers_{}.csv", today),
        )?;
        let liquidation_writer = Self::create_writer(
            &data_dir.join("liquidations"),
            &format!("liquidations_{}.csv", today),
        )?;

        Ok(Self {
            data_dir,
            validation_writer: Mutex::new(validation_writer),
            breaker_writer: Mutex::new(breaker_writer),
            liquidation_writer: Mutex::new(liquidation_writer),
        })
    }

    /// Build from runtime settings; a disabled journal yields `None`
    pub fn from_settings(settings: &crate::config::JournalSettings) -> Result<Option<Self>> {
        if !settings.csv_enabled {
            return Ok(None);
        }
        Self::new(&settings.data_dir).map(Some)
    }

    fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<std::fs::File>> {
        let path = dir.join(filename);
        let file_has_data =
            path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open CSV file")?;

        let writer = WriterBuilder::new()
            .has_headers(!file_has_data)
            .from_writer(file);

        Ok(writer)
    }

    pub fn save_validation(&self, record: ValidationRecord) -> Result<()> {
        let mut writer = self
            .validation_writer
            .lock()
            .map_err(|_| anyhow::anyhow!("validation writer lock poisoned"))?;
        writer
            .serialize(&record)
            .context("Failed to write validation record")?;
        writer.flush().context("Failed to flush validation writer")?;
        Ok(())
    }

    pub fn save_breaker(&self, record: BreakerRecord) -> Result<()> {
        let mut writer = self
            .breaker_writer
            .lock()
            .map_err(|_| anyhow::anyhow!("breaker writer lock poisoned"))?;
        writer
            .serialize(&record)
            .context("Failed to write breaker record")?;
        writer.flush().context("Failed to flush breaker writer")?;
        Ok(())
    }

    pub fn save_liquidation(&self, record: LiquidationRecord) -> Result<()> {
        let mut writer = self
            .liquidation_writer
            .lock()
            .map_err(|_| anyhow::anyhow!("liquidation writer lock poisoned"))?;
        writer
            .serialize(&record)
            .context("Failed to write liquidation record")?;
        writer
            .flush()
            .context("Failed to flush liquidation writer")?;
        Ok(())
    }

    /// Load breaker transitions for the last `days` days
    pub fn load_breaker_history(&self, days: u32) -> Result<Vec<BreakerRecord>> {
        let mut records = Vec::new();
        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let path = self
                .data_dir
                .join("breakers")
                .join(format!("breakers_{}.csv", date.format("%Y-%m-%d")));
            if !path.exists() {
                continue;
            }
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .from_path(&path)
                .context("Failed to open breaker CSV")?;
            for row in reader.deserialize() {
                match row {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(error = %e, path = %path.display(), "skipping bad row"),
                }
            }
        }
        Ok(records)
    }

    /// Load validation failures for the last `days` days
    pub fn load_validation_history(&self, days: u32) -> Result<Vec<ValidationRecord>> {
        let mut records = Vec::new();
        for i in 0..days {
            let date = Utc::now() - chrono::Duration::days(i as i64);
            let path = self
                .data_dir
                .join("validations")
                .join(format!("validations_{}.csv", date.format("%Y-%m-%d")));
            if !path.exists() {
                continue;
            }
            let mut reader = ReaderBuilder::new()
                .has_headers(true)
                .from_path(&path)
                .context("Failed to open validation CSV")?;
            for row in reader.deserialize() {
                match row {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(error = %e, path = %path.display(), "skipping bad row"),
                }
            }
        }
        Ok(records)
    }
}

impl EventSink for EventJournal {
    /// Journal failures are logged, never propagated: a broken disk must
    /// not abort a validation or liquidation path.
    fn emit(&self, event: &RiskEvent) {
        let result = match event {
            RiskEvent::ValidationFailed {
                asset,
                reason,
                timestamp,
            } => self.save_validation(ValidationRecord {
                timestamp: *timestamp,
                asset: asset.to_string(),
                reason: reason.clone(),
                risk_level: 0,
                price: None,
            }),
            RiskEvent::ManipulationFlagged {
                asset,
                risk_level,
                patterns,
                price,
                timestamp,
            } => self.save_validation(ValidationRecord {
                timestamp: *timestamp,
                asset: asset.to_string(),
                reason: patterns
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join("+"),
                risk_level: *risk_level,
                price: Some(*price),
            }),
            RiskEvent::BreakerTransition {
                key,
                from,
                to,
                timestamp,
            } => self.save_breaker(BreakerRecord {
                timestamp: *timestamp,
                key: key.to_string(),
                from_phase: from.to_string(),
                to_phase: to.to_string(),
            }),
            RiskEvent::GlobalEmergency { active, timestamp } => self.save_breaker(BreakerRecord {
                timestamp: *timestamp,
                key: "GLOBAL".to_string(),
                from_phase: if *active { "ANY" } else { "EMERGENCY" }.to_string(),
                to_phase: if *active { "EMERGENCY" } else { "NORMAL" }.to_string(),
            }),
            RiskEvent::LiquidationSignal {
                borrower,
                ltv_bps,
                tier,
                penalty_rate_bps,
                timestamp,
            } => self.save_liquidation(LiquidationRecord {
                timestamp: *timestamp,
                borrower: borrower.clone(),
                ltv_bps: *ltv_bps,
                tier: tier.to_string(),
                penalty_rate_bps: *penalty_rate_bps,
                penalty_total: None,
            }),
            RiskEvent::PenaltyDistributed {
                total, timestamp, ..
            } => self.save_liquidation(LiquidationRecord {
                timestamp: *timestamp,
                borrower: String::new(),
                ltv_bps: 0,
                tier: "PENALTY".to_string(),
                penalty_rate_bps: None,
                penalty_total: Some(*total),
            }),
            // Config changes are visible in tracing output; the journal
            // keeps only operational events
            RiskEvent::ConfigUpdated { .. } => Ok(()),
        };

        if let Err(e) = result {
            warn!(error = %e, "event journal write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::BreakerPhase;
    use crate::types::{OperationKey, OperationKind};

    fn temp_journal(tag: &str) -> (EventJournal, PathBuf) {
        let dir = std::env::temp_dir().join(format!(
            "lendguard_journal_{}_{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        let journal = EventJournal::new(dir.to_str().unwrap()).unwrap();
        (journal, dir)
    }

    #[test]
    fn test_breaker_events_round_trip() {
        let (journal, dir) = temp_journal("breakers");
        journal.emit(&RiskEvent::BreakerTransition {
            key: OperationKey::global(OperationKind::Borrow),
            from: BreakerPhase::Closed,
            to: BreakerPhase::Open,
            timestamp: 99,
        });
        journal.emit(&RiskEvent::GlobalEmergency {
            active: true,
            timestamp: 100,
        });

        let records = journal.load_breaker_history(1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, "BORROW:*");
        assert_eq!(records[0].to_phase, "OPEN");
        assert_eq!(records[1].key, "GLOBAL");

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_validation_events_round_trip() {
        let (journal, dir) = temp_journal("validations");
        journal.emit(&RiskEvent::ValidationFailed {
            asset: crate::types::AssetId::new("BTC"),
            reason: "stale".into(),
            timestamp: 7,
        });
        journal.emit(&RiskEvent::ManipulationFlagged {
            asset: crate::types::AssetId::new("BTC"),
            risk_level: 3,
            patterns: vec![crate::oracle::PatternKind::Spike],
            price: 130,
            timestamp: 8,
        });

        let records = journal.load_validation_history(1).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].reason, "stale");
        assert_eq!(records[1].risk_level, 3);
        assert_eq!(records[1].price, Some(130));

        let _ = fs::remove_dir_all(dir);
    }
}
