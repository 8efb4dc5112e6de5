//! Core types used throughout LendGuard
//!
//! Defines common identifiers and enums for assets, operations, tiers
//! and risk classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a collateral or debt asset.
///
/// Keys the feed table, the price history and the per-asset breakers,
/// giving O(1) lookup without generic dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Collateral asset classification for LTV policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    /// Major assets (BTC, ETH class)
    Blue,
    /// Stablecoins
    Stable,
    /// Long-tail / volatile assets
    Volatile,
}

impl Default for AssetClass {
    fn default() -> Self {
        AssetClass::Volatile
    }
}

impl AssetClass {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blue" | "major" => Some(AssetClass::Blue),
            "stable" => Some(AssetClass::Stable),
            "volatile" | "longtail" => Some(AssetClass::Volatile),
            _ => None,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Blue => write!(f, "BLUE"),
            AssetClass::Stable => write!(f, "STABLE"),
            AssetClass::Volatile => write!(f, "VOLATILE"),
        }
    }
}

/// Protected operation classes gated by circuit breakers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Borrow,
    Repay,
    Withdraw,
    Liquidate,
    PriceUpdate,
}

impl OperationKind {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "borrow" => Some(OperationKind::Borrow),
            "repay" => Some(OperationKind::Repay),
            "withdraw" => Some(OperationKind::Withdraw),
            "liquidate" => Some(OperationKind::Liquidate),
            "price_update" | "priceupdate" => Some(OperationKind::PriceUpdate),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Borrow => write!(f, "BORROW"),
            OperationKind::Repay => write!(f, "REPAY"),
            OperationKind::Withdraw => write!(f, "WITHDRAW"),
            OperationKind::Liquidate => write!(f, "LIQUIDATE"),
            OperationKind::PriceUpdate => write!(f, "PRICE_UPDATE"),
        }
    }
}

/// Circuit breaker key: an operation class, optionally scoped to one asset
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub kind: OperationKind,
    pub asset: Option<AssetId>,
}

impl OperationKey {
    pub fn global(kind: OperationKind) -> Self {
        Self { kind, asset: None }
    }

    pub fn for_asset(kind: OperationKind, asset: AssetId) -> Self {
        Self {
            kind,
            asset: Some(asset),
        }
    }
}

impl fmt::Display for OperationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.asset {
            Some(asset) => write!(f, "{}:{}", self.kind, asset),
            None => write!(f, "{}:*", self.kind),
        }
    }
}

/// Borrower tier from the identity layer; grants an LTV bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BorrowerTier {
    Standard,
    Silver,
    Gold,
    Platinum,
}

impl Default for BorrowerTier {
    fn default() -> Self {
        BorrowerTier::Standard
    }
}

impl fmt::Display for BorrowerTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BorrowerTier::Standard => write!(f, "STANDARD"),
            BorrowerTier::Silver => write!(f, "SILVER"),
            BorrowerTier::Gold => write!(f, "GOLD"),
            BorrowerTier::Platinum => write!(f, "PLATINUM"),
        }
    }
}

/// Health classification of a borrow position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTier {
    /// LTV below the warning threshold
    Healthy,
    /// LTV between warning and liquidation thresholds; alert only
    Warning,
    /// LTV at or above the liquidation threshold
    Liquidatable,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Healthy => write!(f, "HEALTHY"),
            RiskTier::Warning => write!(f, "WARNING"),
            RiskTier::Liquidatable => write!(f, "LIQUIDATABLE"),
        }
    }
}

/// Outcome of a liquidation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationDecision {
    /// Position is healthy; nothing to do
    None,
    /// Position crossed the warning threshold; alert emitted, no forced action
    Warn { ltv_bps: u64 },
    /// Position is liquidatable at the given penalty rate
    Liquidatable { ltv_bps: u64, penalty_rate_bps: u64 },
}

/// Admin capability token.
///
/// Issued by the host at core construction; every configuration mutation
/// takes one explicitly. There is no ambient admin identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCap {
    id: u64,
}

impl AdminCap {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A borrow position as seen by the risk engine.
///
/// Owned by the borrowing layer; the risk engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowPosition {
    pub borrower: String,
    /// Collateral amounts per asset, in whole units of each asset
    pub collateral: Vec<(AssetId, u64)>,
    pub borrowed_amount: u64,
    pub borrowed_asset: AssetId,
    pub created_at: u64,
    pub updated_at: u64,
}

impl BorrowPosition {
    pub fn single(
        borrower: impl Into<String>,
        collateral_asset: AssetId,
        collateral_amount: u64,
        borrowed_asset: AssetId,
        borrowed_amount: u64,
        now: u64,
    ) -> Self {
        Self {
            borrower: borrower.into(),
            collateral: vec![(collateral_asset, collateral_amount)],
            borrowed_amount,
            borrowed_asset,
            created_at: now,
            updated_at: now,
        }
    }
}
