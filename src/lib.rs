//! DIGITWATCH: digit-cluster pattern engine and auto-trader for Deriv
//! synthetic indices.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod settings;
pub mod engine;
pub mod venue;
pub mod storage;
pub mod dashboard;
