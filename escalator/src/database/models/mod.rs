//! Database models for the escalation engine.
//!
//! These models map directly to the database schema. Structured attributes
//! are stored as JSON text and parsed by the domain layer.

pub mod channel;
pub mod event;
pub mod notification;
pub mod user;
pub mod workflow;

pub use channel::*;
pub use event::*;
pub use notification::*;
pub use user::*;
pub use workflow::*;
