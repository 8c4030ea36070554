//! Notification delivery.
//!
//! This module provides everything between an escalation step and its audit
//! record:
//! - Transports (HTTP and SMTP) behind traits
//! - One sender per channel type, selected through a registry
//! - The repository-backed preference filter
//! - The audit logger

pub mod channels;
pub mod dispatcher;
pub mod logger;
pub mod preferences;
pub mod transport;

pub use channels::{ChannelSender, DeliveryOutcome, DispatchContext};
pub use dispatcher::{ChannelDispatcher, ChannelRegistry};
pub use logger::{LogEntry, NotificationLogger};
pub use preferences::PreferenceFilter;
pub use transport::{
    EmailMessage, EmailTransport, HttpClient, HttpResponse, LogEmailTransport, ReqwestHttpClient,
    SmtpEmailTransport,
};
