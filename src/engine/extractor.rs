//! Digit extractor.
//!
//! Turns a raw quote into its trailing decimal digit at the symbol's pip
//! precision. Precision comes from the venue's symbol metadata; a tick for
//! a symbol with no known precision is rejected rather than guessed at.

use std::collections::HashMap;

use tracing::debug;

use crate::types::{Digit, Symbol, Tick, WatchError};

/// Largest precision the venue is expected to report.
const MAX_PRECISION: u32 = 10;

/// Last digit of `quote` formatted to `precision` decimal places.
///
/// Returns `None` for NaN or infinite quotes.
pub fn trailing_digit(quote: f64, precision: u32) -> Option<Digit> {
    if !quote.is_finite() {
        return None;
    }
    let formatted = format!("{:.*}", precision as usize, quote);
    let last = formatted.chars().last()?.to_digit(10)?;
    Digit::new(last as u8).ok()
}

/// Convert a pip size (e.g. `0.001`) to a count of decimal places (`3`).
pub fn pip_to_precision(pip: f64) -> Option<u32> {
    if !pip.is_finite() || pip <= 0.0 {
        return None;
    }
    let places = (-pip.log10()).round();
    if places <= 0.0 {
        Some(0)
    } else if places > MAX_PRECISION as f64 {
        None
    } else {
        Some(places as u32)
    }
}

/// Known decimal precision per symbol.
#[derive(Debug, Clone, Default)]
pub struct PrecisionTable {
    precisions: HashMap<Symbol, u32>,
}

impl PrecisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the precision for a symbol.
    pub fn set(&mut self, symbol: Symbol, precision: u32) {
        if precision > MAX_PRECISION {
            debug!(symbol = %symbol, precision, "Ignoring implausible precision");
            return;
        }
        if self.precisions.insert(symbol.clone(), precision) != Some(precision) {
            debug!(symbol = %symbol, precision, "Precision registered");
        }
    }

    /// Record a precision only if none is known yet.
    pub fn set_if_absent(&mut self, symbol: Symbol, precision: u32) {
        if !self.precisions.contains_key(&symbol) {
            self.set(symbol, precision);
        }
    }

    pub fn get(&self, symbol: &Symbol) -> Option<u32> {
        self.precisions.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.precisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precisions.is_empty()
    }

    /// Extract the trailing digit of a tick.
    pub fn extract(&self, tick: &Tick) -> Result<Digit, WatchError> {
        let precision = self
            .get(&tick.symbol)
            .ok_or_else(|| WatchError::UnknownPrecision(tick.symbol.to_string()))?;

        trailing_digit(tick.quote, precision).ok_or_else(|| WatchError::MalformedTick {
            symbol: tick.symbol.to_string(),
            reason: format!("quote {} is not a finite number", tick.quote),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
