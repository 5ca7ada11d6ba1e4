//! Historical performance multipliers for cross-run learning.

use serde::{Deserialize, Serialize};
use crate::id::ExecutorId;
use crate::task::TaskCategory;

/// Smoothing factor for new observations.
pub const PERFORMANCE_ALPHA: f64 = 0.3;

/// One learned multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    /// Task category the observation applies to
    pub category: TaskCategory,
    /// Executor observed
    pub executor: ExecutorId,
    /// Current multiplier
    pub multiplier: f64,
    /// Observations folded in so far
    pub observations: u64,
}

/// Multiplier per (category, executor), nominally 1.0.
///
/// Entries are kept sorted by (category, executor) so the serialized form is
/// stable across runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceHistory {
    entries: Vec<PerformanceEntry>,
}

impl PerformanceHistory {
    /// Empty history; every multiplier is 1.0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplier for an executor on a category.
    pub fn multiplier(&self, category: TaskCategory, executor: &ExecutorId) -> f64 {
        self.find(category, executor)
            .map(|i| self.entries[i].multiplier)
            .unwrap_or(1.0)
    }

    /// Fold an observed performance score into the multiplier:
    /// `new = (1 - alpha) * current + alpha * observed`.
    pub fn record(&mut self, category: TaskCategory, executor: &ExecutorId, performance: f64) -> f64 {
        match self.find(category, executor) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.multiplier =
                    (1.0 - PERFORMANCE_ALPHA) * entry.multiplier + PERFORMANCE_ALPHA * performance;
                entry.observations += 1;
                entry.multiplier
            }
            None => {
                let multiplier = (1.0 - PERFORMANCE_ALPHA) + PERFORMANCE_ALPHA * performance;
                let entry = PerformanceEntry {
                    category,
                    executor: executor.clone(),
                    multiplier,
                    observations: 1,
                };
                let pos = self
                    .entries
                    .partition_point(|e| (e.category, &e.executor) < (category, executor));
                self.entries.insert(pos, entry);
                multiplier
            }
        }
    }

    /// All learned entries.
    pub fn entries(&self) -> &[PerformanceEntry] {
        &self.entries
    }

    fn find(&self, category: TaskCategory, executor: &ExecutorId) -> Option<usize> {
        self.entries
            .binary_search_by(|e| (e.category, &e.executor).cmp(&(category, executor)))
            .ok()
    }
}
