//! Symbol registry.
//!
//! Owns, per subscribed symbol, one `DigitHistory` and ten
//! `ClusterTracker`s. The registry is an explicit value owned by the
//! monitor and handed to whoever processes ticks, so each symbol's state is
//! only ever touched by that symbol's update path.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::history::DigitHistory;
use super::tracker::{ClusterTracker, TrackerParams, TrackerPhase, Transition};
use crate::types::{Digit, Symbol};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A trigger, tagged with the symbol it fired on.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub symbol: Symbol,
    pub digit: Digit,
    pub cluster_count: u32,
    /// Sequence position of the isolated occurrence.
    pub position: u64,
    pub timestamp: DateTime<Utc>,
}

/// Observable outcome of processing one digit.
#[derive(Debug, Clone, PartialEq)]
pub enum PatternEvent {
    /// The tracker adopted a higher count. `readopted` marks clusters that
    /// were already counted before an eviction reset.
    ClusterFormed {
        symbol: Symbol,
        digit: Digit,
        count: u32,
        readopted: bool,
    },
    /// The last cluster of a sequence left the window. `count` is the
    /// highest count the sequence reached.
    SequenceEnded {
        symbol: Symbol,
        digit: Digit,
        count: u32,
    },
    Triggered(TriggerEvent),
}

// ---------------------------------------------------------------------------
// Per-symbol state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SymbolState {
    history: DigitHistory,
    trackers: [ClusterTracker; 10],
    last_quote: Option<f64>,
    ticks_seen: u64,
}

impl SymbolState {
    fn new(capacity: usize) -> Self {
        Self {
            history: DigitHistory::new(capacity),
            trackers: Digit::ALL.map(ClusterTracker::new),
            last_quote: None,
            ticks_seen: 0,
        }
    }

    pub fn history(&self) -> &DigitHistory {
        &self.history
    }

    pub fn tracker(&self, digit: Digit) -> &ClusterTracker {
        &self.trackers[digit.index()]
    }

    pub fn trackers(&self) -> &[ClusterTracker; 10] {
        &self.trackers
    }

    pub fn last_quote(&self) -> Option<f64> {
        self.last_quote
    }

    fn reset(&mut self) {
        self.history.clear();
        for tracker in &mut self.trackers {
            tracker.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshots (read models for the dashboard)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct TrackerSnapshot {
    pub digit: Digit,
    pub clusters: u32,
    pub active: bool,
    pub waiting_for_trigger: bool,
    pub last_cluster_end: Option<u64>,
    pub phase: TrackerPhase,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolSnapshot {
    pub symbol: Symbol,
    pub last_quote: Option<f64>,
    pub ticks_seen: u64,
    pub digits: Vec<Digit>,
    /// Cluster length at each window position, 0 outside clusters.
    pub cluster_sizes: Vec<usize>,
    pub trackers: Vec<TrackerSnapshot>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    capacity: usize,
    symbols: BTreeMap<Symbol, SymbolState>,
}

impl SymbolRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            symbols: BTreeMap::new(),
        }
    }

    /// Registry pre-populated with the given symbols.
    pub fn with_symbols(capacity: usize, symbols: impl IntoIterator<Item = Symbol>) -> Self {
        let mut registry = Self::new(capacity);
        for symbol in symbols {
            registry.subscribe(symbol);
        }
        registry
    }

    /// Start tracking a symbol. Re-subscribing keeps existing state.
    pub fn subscribe(&mut self, symbol: Symbol) {
        let capacity = self.capacity;
        self.symbols
            .entry(symbol)
            .or_insert_with(|| SymbolState::new(capacity));
    }

    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> + '_ {
        self.symbols.keys()
    }

    pub fn state(&self, symbol: &Symbol) -> Option<&SymbolState> {
        self.symbols.get(symbol)
    }

    /// Append a digit for `symbol` and update its ten trackers in order.
    ///
    /// Returns `None` if the symbol is not subscribed.
    pub fn process(
        &mut self,
        symbol: &Symbol,
        quote: f64,
        digit: Digit,
        params: &TrackerParams,
    ) -> Option<Vec<PatternEvent>> {
        let state = self.symbols.get_mut(symbol)?;
        state.last_quote = Some(quote);
        state.ticks_seen += 1;
        state.history.append(digit);

        let mut events = Vec::new();
        for tracker in &mut state.trackers {
            let update = tracker.update(&state.history, params);
            let tracked = tracker.digit();

            match update.transition {
                Some(Transition::ClusterFormed { count, readopted }) => {
                    events.push(PatternEvent::ClusterFormed {
                        symbol: symbol.clone(),
                        digit: tracked,
                        count,
                        readopted,
                    });
                }
                Some(Transition::Reset {
                    previous_count,
                    sequence_end,
                }) => match sequence_end {
                    Some(peak) => events.push(PatternEvent::SequenceEnded {
                        symbol: symbol.clone(),
                        digit: tracked,
                        count: peak,
                    }),
                    None => debug!(
                        symbol = %symbol,
                        digit = %tracked,
                        previous_count,
                        "Cluster aged out, sequence continues"
                    ),
                },
                None => {}
            }

            if let Some(trigger) = update.trigger {
                debug!(
                    symbol = %symbol,
                    digit = %trigger.digit,
                    clusters = trigger.cluster_count,
                    position = trigger.position,
                    "Trigger fired"
                );
                events.push(PatternEvent::Triggered(TriggerEvent {
                    symbol: symbol.clone(),
                    digit: trigger.digit,
                    cluster_count: trigger.cluster_count,
                    position: trigger.position,
                    timestamp: Utc::now(),
                }));
            }
        }

        Some(events)
    }

    /// Return every symbol to an empty window with idle trackers.
    pub fn reset_all(&mut self) {
        for state in self.symbols.values_mut() {
            state.reset();
        }
    }

    /// Read model of every symbol, in symbol order.
    pub fn snapshot(&self, min_cluster_size: u32) -> Vec<SymbolSnapshot> {
        self.symbols
            .iter()
            .map(|(symbol, state)| SymbolSnapshot {
                symbol: symbol.clone(),
                last_quote: state.last_quote,
                ticks_seen: state.ticks_seen,
                digits: state.history.snapshot(),
                cluster_sizes: state.history.cluster_sizes(),
                trackers: state
                    .trackers
                    .iter()
                    .map(|t| TrackerSnapshot {
                        digit: t.digit(),
                        clusters: t.cluster_count(),
                        active: t.is_active(),
                        waiting_for_trigger: t.is_waiting_for_trigger(),
                        last_cluster_end: t.last_cluster_end(),
                        phase: t.phase(min_cluster_size),
                    })
                    .collect(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
