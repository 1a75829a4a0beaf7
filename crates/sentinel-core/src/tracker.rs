//! Per-session violation aggregation and integrity scoring.
//!
//! Owned exclusively by the session's monitor loop.
//!
//! Streaks: when a sample's violation set equals the previous sample's set,
//! every type in it advances by one. A differing set restarts the streak at 1
//! for the types it contains; types absent from the current sample, or every
//! type on a clean sample, drop to 0. So `[A, A, B, A]` leaves A at 1.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Severity, ViolationType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationAggregate {
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_count: u64,
    pub streak: u32,
}

#[derive(Debug, Clone)]
pub struct ViolationTracker {
    aggregates: BTreeMap<ViolationType, ViolationAggregate>,
    previous: BTreeSet<ViolationType>,
    integrity_score: f64,
    alert_count: u64,
    occurrences: u64,
}

impl Default for ViolationTracker {
    fn default() -> Self {
        Self {
            aggregates: BTreeMap::new(),
            previous: BTreeSet::new(),
            integrity_score: 1.0,
            alert_count: 0,
            occurrences: 0,
        }
    }
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sample's violations into the aggregates and the score.
    pub fn record(&mut self, violations: &[ViolationType], at: DateTime<Utc>) {
        let current: BTreeSet<ViolationType> = violations.iter().copied().collect();
        let repeated = !current.is_empty() && current == self.previous;

        for (ty, agg) in self.aggregates.iter_mut() {
            if !current.contains(ty) {
                agg.streak = 0;
            }
        }

        for ty in &current {
            let agg = self.aggregates.entry(*ty).or_insert(ViolationAggregate {
                first_seen: at,
                last_seen: at,
                total_count: 0,
                streak: 0,
            });
            agg.last_seen = at;
            agg.total_count += 1;
            agg.streak = if repeated { agg.streak + 1 } else { 1 };

            self.occurrences += 1;
            self.integrity_score = (self.integrity_score - ty.severity().penalty()).clamp(0.0, 1.0);
        }

        self.previous = current;
    }

    pub fn record_alert(&mut self) {
        self.alert_count += 1;
    }

    pub fn integrity_score(&self) -> f64 {
        self.integrity_score
    }

    pub fn alert_count(&self) -> u64 {
        self.alert_count
    }

    /// Total violation occurrences recorded.
    pub fn occurrences(&self) -> u64 {
        self.occurrences
    }

    pub fn aggregate(&self, ty: ViolationType) -> Option<&ViolationAggregate> {
        self.aggregates.get(&ty)
    }

    pub fn aggregates(&self) -> impl Iterator<Item = (&ViolationType, &ViolationAggregate)> {
        self.aggregates.iter()
    }

    pub fn streak(&self, ty: ViolationType) -> u32 {
        self.aggregates.get(&ty).map_or(0, |a| a.streak)
    }

    pub fn max_streak(&self) -> Option<(ViolationType, u32)> {
        self.aggregates
            .iter()
            .map(|(ty, a)| (*ty, a.streak))
            .max_by_key(|(_, streak)| *streak)
    }

    /// Whether any critical-severity violation was ever recorded.
    pub fn has_critical(&self) -> bool {
        self.aggregates
            .keys()
            .any(|ty| ty.severity() == Severity::Critical)
    }
}
