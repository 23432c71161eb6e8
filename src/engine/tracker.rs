//! Cluster tracker: the per-(symbol, digit) state machine.
//!
//! Each tick the tracker compares the window's cluster count for its digit
//! with the count it has recorded:
//!
//! - more clusters: adopt the new count, become active, re-arm the trigger;
//! - fewer clusters: a counted cluster aged out of the window, reset to idle;
//! - same count: no transition.
//!
//! Once the count reaches `min_cluster_size`, the first isolated occurrence
//! of the digit after the most recent cluster fires a trigger. The
//! `waiting_for_trigger` flag then suppresses further triggers until the
//! cluster count changes in either direction.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::history::DigitHistory;
use crate::types::Digit;

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// How an occurrence of the digit is judged isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationPolicy {
    /// Wait one tick: fire when the occurrence is followed by a different
    /// digit. Adds one tick of latency, never fires on a run's first tick.
    #[default]
    Confirmed,
    /// Fire on the tick the occurrence appears if its predecessor differs.
    Immediate,
}

impl fmt::Display for IsolationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationPolicy::Confirmed => write!(f, "confirmed"),
            IsolationPolicy::Immediate => write!(f, "immediate"),
        }
    }
}

/// Parameters read by every tracker on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerParams {
    pub min_cluster_size: u32,
    pub isolation: IsolationPolicy,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 5,
            isolation: IsolationPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Coarse lifecycle phase, derived from the tracker fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackerPhase {
    Idle,
    Accumulating,
    Waiting,
}

/// A count change observed during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The tracker adopted a higher count. `readopted` is set when every
    /// one of those clusters was already counted before an eviction reset,
    /// so nothing new formed.
    ClusterFormed { count: u32, readopted: bool },
    /// A counted cluster aged out and the tracker went back to idle.
    /// `sequence_end` carries the highest count the sequence reached once
    /// no cluster of the digit is left in the window.
    Reset {
        previous_count: u32,
        sequence_end: Option<u32>,
    },
}

/// An isolated occurrence after enough clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub digit: Digit,
    pub cluster_count: u32,
    /// Sequence position of the isolated occurrence.
    pub position: u64,
}

/// Everything one `update` call produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackerUpdate {
    pub transition: Option<Transition>,
    pub trigger: Option<Trigger>,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTracker {
    digit: Digit,
    current_cluster_count: u32,
    last_cluster_end: Option<u64>,
    active: bool,
    waiting_for_trigger: bool,
    /// Highest count since the window last held no cluster of the digit.
    sequence_peak: u32,
    /// Clusters still in the window when an eviction reset the tracker.
    carried: u32,
}

impl ClusterTracker {
    pub fn new(digit: Digit) -> Self {
        Self {
            digit,
            current_cluster_count: 0,
            last_cluster_end: None,
            active: false,
            waiting_for_trigger: false,
            sequence_peak: 0,
            carried: 0,
        }
    }

    pub fn digit(&self) -> Digit {
        self.digit
    }

    pub fn cluster_count(&self) -> u32 {
        self.current_cluster_count
    }

    pub fn last_cluster_end(&self) -> Option<u64> {
        self.last_cluster_end
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_waiting_for_trigger(&self) -> bool {
        self.waiting_for_trigger
    }

    pub fn phase(&self, min_cluster_size: u32) -> TrackerPhase {
        if !self.active {
            TrackerPhase::Idle
        } else if self.current_cluster_count >= min_cluster_size {
            TrackerPhase::Waiting
        } else {
            TrackerPhase::Accumulating
        }
    }

    /// Back to idle, forgetting the sequence.
    pub fn reset(&mut self) {
        self.clear_progress();
        self.sequence_peak = 0;
        self.carried = 0;
    }

    fn clear_progress(&mut self) {
        self.current_cluster_count = 0;
        self.last_cluster_end = None;
        self.active = false;
        self.waiting_for_trigger = false;
    }

    /// Run once after every append to the symbol's history.
    pub fn update(&mut self, history: &DigitHistory, params: &TrackerParams) -> TrackerUpdate {
        let summary = history.clusters(self.digit);
        let mut outcome = TrackerUpdate::default();

        match summary.count.cmp(&self.current_cluster_count) {
            Ordering::Greater => {
                let readopted = summary.count <= self.carried;
                self.carried = 0;
                self.sequence_peak = self.sequence_peak.max(summary.count);
                self.current_cluster_count = summary.count;
                self.last_cluster_end = summary.last_end;
                self.active = true;
                self.waiting_for_trigger = false;
                outcome.transition = Some(Transition::ClusterFormed {
                    count: summary.count,
                    readopted,
                });
            }
            Ordering::Less => {
                let previous_count = self.current_cluster_count;
                self.clear_progress();
                // Eviction drops at most one cluster per tick, so a non-zero
                // remainder is re-adopted on the next tick.
                let sequence_end = if summary.count == 0 {
                    Some(std::mem::take(&mut self.sequence_peak))
                } else {
                    self.carried = summary.count;
                    None
                };
                outcome.transition = Some(Transition::Reset {
                    previous_count,
                    sequence_end,
                });
            }
            Ordering::Equal => {
                // A growing run moves the end without changing the count.
                if self.active {
                    self.last_cluster_end = summary.last_end;
                }
            }
        }

        let armed = self.active
            && !self.waiting_for_trigger
            && self.current_cluster_count >= params.min_cluster_size.max(1);

        if armed {
            if let Some(position) = self.isolated_occurrence(history, params.isolation) {
                self.waiting_for_trigger = true;
                outcome.trigger = Some(Trigger {
                    digit: self.digit,
                    cluster_count: self.current_cluster_count,
                    position,
                });
            }
        }

        outcome
    }

    /// Position of an isolated occurrence of the digit that this tick makes
    /// decidable, if there is one.
    fn isolated_occurrence(&self, history: &DigitHistory, policy: IsolationPolicy) -> Option<u64> {
        let last = history.last_seq()?;

        let candidate = match policy {
            IsolationPolicy::Immediate => last,
            IsolationPolicy::Confirmed => {
                if history.get(last)? == self.digit {
                    return None;
                }
                last.checked_sub(1)?
            }
        };

        if history.get(candidate)? != self.digit {
            return None;
        }
        if self.last_cluster_end.is_some_and(|end| candidate <= end) {
            return None;
        }

        let preceded_by_same = candidate
            .checked_sub(1)
            .and_then(|prev| history.get(prev))
            .is_some_and(|prev| prev == self.digit);

        if preceded_by_same {
            None
        } else {
            Some(candidate)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
