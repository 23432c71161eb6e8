//! Core engine: tick → digit → history → cluster trackers → trade intent.
//!
//! Everything on the per-tick path is synchronous and in-memory. Trade I/O
//! happens in the executor, on its own task.

pub mod alerts;
pub mod dispatcher;
pub mod executor;
pub mod extractor;
pub mod history;
pub mod monitor;
pub mod registry;
pub mod session;
pub mod stats;
pub mod tracker;

pub use alerts::{Alert, AlertKind, AlertLevel, AlertLog, AlertRecord};
pub use dispatcher::{DispatchOutcome, GateRefusal, SignalDispatcher};
pub use executor::TradeExecutor;
pub use monitor::{Monitor, MonitorParts, SharedRegistry};
pub use registry::{PatternEvent, SymbolRegistry, SymbolSnapshot, TriggerEvent};
pub use session::{shared_session, Session, SharedSession};
pub use stats::{Statistics, StatisticsSnapshot};
pub use tracker::{IsolationPolicy, TrackerParams};
