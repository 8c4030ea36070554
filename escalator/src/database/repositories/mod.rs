//! Repository layer for database access.
//!
//! Each table group sits behind an `async_trait` repository so the engine can
//! be wired against SQLite in production and in-memory fakes in tests.

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

use std::sync::Arc;

use crate::database::DbPool;

/// Repositories the engine depends on, bundled for injection.
#[derive(Clone)]
pub struct Repositories {
    pub events: Arc<dyn EventRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub users: Arc<dyn UserRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

impl Repositories {
    /// SQLite-backed repositories sharing one pool.
    pub fn sqlx(pool: DbPool) -> Self {
        Self {
            events: Arc::new(SqlxEventRepository::new(pool.clone())),
            workflows: Arc::new(SqlxWorkflowRepository::new(pool.clone())),
            channels: Arc::new(SqlxChannelRepository::new(pool.clone())),
            users: Arc::new(SqlxUserRepository::new(pool.clone())),
            notifications: Arc::new(SqlxNotificationRepository::new(pool)),
        }
    }
}
