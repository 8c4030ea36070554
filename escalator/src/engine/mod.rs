//! Escalation engine: workflow matching, step scheduling and the sweep of
//! delayed steps.

pub mod queue;
pub mod service;
pub mod sweeper;

pub use queue::DelayedDispatchQueue;
pub use service::{EscalationEngine, ProcessSummary, SweepSummary};
pub use sweeper::EscalationSweeper;
