//! Per-tick quoting pipeline: market data → risk guards → spread.
//!
//! `TickEngine` wires the three components into one deterministic pass per
//! instrument per tick. The guard check runs first, on a strict cache
//! read, so that a halt short-circuits pricing entirely; otherwise the
//! spread is computed from a pricing-mode read and shaped by the guard's
//! soft actions.

pub mod config;
pub mod tick;

pub use config::{EngineConfig, EngineConfigError};
pub use tick::{EngineError, QuoteAction, QuoteDecision, TickEngine, TickInputs};
