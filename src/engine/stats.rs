//! Pattern statistics.
//!
//! Counts how many cluster sequences ended at each cluster count, plus
//! pipeline throughput counters. Passive: nothing reads these back into the
//! engine.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatisticsSnapshot {
    /// Cluster count at reset → number of sequences that ended there.
    pub ended_at: BTreeMap<u32, u64>,
    pub ticks_processed: u64,
    pub ticks_dropped: u64,
    pub triggers: u64,
    pub trades_executed: u64,
    pub trades_failed: u64,
    pub since: DateTime<Utc>,
}

impl StatisticsSnapshot {
    fn empty() -> Self {
        Self {
            ended_at: BTreeMap::new(),
            ticks_processed: 0,
            ticks_dropped: 0,
            triggers: 0,
            trades_executed: 0,
            trades_failed: 0,
            since: Utc::now(),
        }
    }
}

pub struct Statistics {
    inner: Mutex<StatisticsSnapshot>,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StatisticsSnapshot::empty()),
        }
    }

    /// A cluster sequence was invalidated after reaching `count` clusters.
    /// Sequences that never got past a single cluster are not counted.
    pub fn record_sequence_end(&self, count: u32) {
        if count >= 2 {
            *self.inner.lock().ended_at.entry(count).or_insert(0) += 1;
        }
    }

    pub fn record_tick(&self) {
        self.inner.lock().ticks_processed += 1;
    }

    pub fn record_dropped_tick(&self) {
        self.inner.lock().ticks_dropped += 1;
    }

    pub fn record_trigger(&self) {
        self.inner.lock().triggers += 1;
    }

    pub fn record_trade(&self, success: bool) {
        let mut inner = self.inner.lock();
        if success {
            inner.trades_executed += 1;
        } else {
            inner.trades_failed += 1;
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = StatisticsSnapshot::empty();
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
