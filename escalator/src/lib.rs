//! escalator library crate.
//!
//! Matches security events against per-organization workflows and delivers
//! alerts through timed, multi-channel escalation policies with a durable
//! audit trail.

pub mod config;
pub mod database;
pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod notification;
pub mod utils;

pub use error::{Error, Result};
