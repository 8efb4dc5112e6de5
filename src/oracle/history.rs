//! Bounded per-asset price history
//!
//! Append-only, oldest-evicted working set consumed by the manipulation
//! detector. Invariant: timestamps are non-decreasing.

use std::collections::VecDeque;

use crate::error::{Result, RiskError};
use crate::oracle::PricePoint;

/// Fixed-capacity sequence of validated price points for one asset
#[derive(Debug, Clone)]
pub struct PriceHistory {
    points: VecDeque<PricePoint>,
    capacity: usize,
}

impl PriceHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a point, evicting the oldest at capacity.
    ///
    /// A point older than the newest entry violates the monotonic-clock
    /// contract and is rejected without touching the buffer.
    pub fn push(&mut self, point: PricePoint) -> Result<()> {
        if let Some(last) = self.points.back() {
            if point.timestamp < last.timestamp {
                return Err(RiskError::StalePrice {
                    age_secs: last.timestamp - point.timestamp,
                    max_delay_secs: 0,
                });
            }
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
        Ok(())
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent `n` points, oldest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &PricePoint> {
        let skip = self.points.len().saturating_sub(n);
        self.points.iter().skip(skip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> {
        self.points.iter()
    }
}
