//! Penalty distributor
//!
//! Splits a liquidation penalty among liquidator, platform reserve,
//! insurance fund and (optionally) the borrower. Shares always sum
//! exactly to the input: the integer-truncation remainder is assigned to
//! the platform bucket.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RiskError};
use crate::math::{safe_percentage, BPS_DENOMINATOR};

/// Distribution rates in bps. The borrower-protection share is the
/// residual `10_000 - (liquidator + platform + insurance)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PenaltyDistributionConfig {
    pub liquidator_share_bps: u64,
    pub platform_share_bps: u64,
    pub insurance_share_bps: u64,
    /// When false, the borrower's residual share goes to the platform
    pub borrower_protection: bool,
}

impl Default for PenaltyDistributionConfig {
    fn default() -> Self {
        Self {
            liquidator_share_bps: 5_000,
            platform_share_bps: 3_000,
            insurance_share_bps: 1_500,
            borrower_protection: true,
        }
    }
}

impl PenaltyDistributionConfig {
    pub fn validate(&self) -> Result<()> {
        let sum = self
            .liquidator_share_bps
            .saturating_add(self.platform_share_bps)
            .saturating_add(self.insurance_share_bps);
        if sum > BPS_DENOMINATOR {
            return Err(RiskError::InvalidConfig(format!(
                "distribution shares sum to {sum} bps, above 10000"
            )));
        }
        Ok(())
    }

    fn borrower_share_bps(&self) -> u64 {
        BPS_DENOMINATOR
            - self.liquidator_share_bps
            - self.platform_share_bps
            - self.insurance_share_bps
    }
}

/// Exact four-way split of one penalty amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySplit {
    pub liquidator: u64,
    pub platform: u64,
    pub insurance: u64,
    pub borrower_protection: u64,
}

impl PenaltySplit {
    pub fn total(&self) -> u64 {
        self.liquidator + self.platform + self.insurance + self.borrower_protection
    }
}

/// Computes penalty splits under a validated config
#[derive(Debug, Clone)]
pub struct PenaltyDistributor {
    config: PenaltyDistributionConfig,
}

impl PenaltyDistributor {
    pub fn new(config: PenaltyDistributionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn set_config(&mut self, config: PenaltyDistributionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> PenaltyDistributionConfig {
        self.config
    }

    /// Split `total` by the configured rates.
    ///
    /// The platform bucket is computed by subtraction, so it absorbs the
    /// truncation remainder (and the borrower share when protection is
    /// off) and the four shares always sum exactly to `total`.
    pub fn distribute(&self, total: u64) -> Result<PenaltySplit> {
        let liquidator = safe_percentage(total, self.config.liquidator_share_bps)?;
        let insurance = safe_percentage(total, self.config.insurance_share_bps)?;
        let borrower = if self.config.borrower_protection {
            safe_percentage(total, self.config.borrower_share_bps())?
        } else {
            0
        };
        // total >= the sum of floored shares, so this cannot underflow
        let platform = total - liquidator - insurance - borrower;

        Ok(PenaltySplit {
            liquidator,
            platform,
            insurance,
            borrower_protection: borrower,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_over_full_rejected() {
        let config = PenaltyDistributionConfig {
            liquidator_share_bps: 6_000,
            platform_share_bps: 3_000,
            insurance_share_bps: 2_000,
            borrower_protection: false,
        };
        assert!(PenaltyDistributor::new(config).is_err());
    }

    #[test]
    fn test_remainder_goes_to_platform() {
        // rates 5000/3000/2000, total 225: floored shares 112/67/45,
        // remainder 1 lands on platform
        let distributor = PenaltyDistributor::new(PenaltyDistributionConfig {
            liquidator_share_bps: 5_000,
            platform_share_bps: 3_000,
            insurance_share_bps: 2_000,
            borrower_protection: true,
        })
        .unwrap();
        let split = distributor.distribute(225).unwrap();
        assert_eq!(split.liquidator, 112);
        assert_eq!(split.platform, 68);
        assert_eq!(split.insurance, 45);
        assert_eq!(split.borrower_protection, 0);
        assert_eq!(split.total(), 225);
    }

    #[test]
    fn test_borrower_residual_share() {
        // 500 bps residual for the borrower
        let distributor = PenaltyDistributor::new(PenaltyDistributionConfig {
            liquidator_share_bps: 5_000,
            platform_share_bps: 3_000,
            insurance_share_bps: 1_500,
            borrower_protection: true,
        })
        .unwrap();
        let split = distributor.distribute(10_000).unwrap();
        assert_eq!(split.liquidator, 5_000);
        assert_eq!(split.platform, 3_000);
        assert_eq!(split.insurance, 1_500);
        assert_eq!(split.borrower_protection, 500);
        assert_eq!(split.total(), 10_000);
    }

    #[test]
    fn test_disabled_protection_folds_into_platform() {
        let distributor = PenaltyDistributor::new(PenaltyDistributionConfig {
            liquidator_share_bps: 5_000,
            platform_share_bps: 3_000,
            insurance_share_bps: 1_500,
            borrower_protection: false,
        })
        .unwrap();
        let split = distributor.distribute(10_000).unwrap();
        assert_eq!(split.borrower_protection, 0);
        assert_eq!(split.platform, 3_500);
        assert_eq!(split.total(), 10_000);
    }

    #[test]
    fn test_split_sums_exactly_across_awkward_totals() {
        let distributor = PenaltyDistributor::new(PenaltyDistributionConfig {
            liquidator_share_bps: 3_333,
            platform_share_bps: 3_333,
            insurance_share_bps: 3_333,
            borrower_protection: true,
        })
        .unwrap();
        for total in [0u64, 1, 2, 3, 7, 99, 10_001, 123_456_789] {
            let split = distributor.distribute(total).unwrap();
            assert_eq!(split.total(), total, "total {total} did not round-trip");
        }
    }
}
