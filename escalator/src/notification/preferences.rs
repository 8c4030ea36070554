//! Repository-backed preference filter.
//!
//! Wraps the pure rules in [`UserNotificationPreferences::evaluate`] with the
//! store lookup, the workflow opt-in and the DND timezone. Lookup failures
//! fail open: the decision is `allow` with the error in the reason.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::database::repositories::UserRepository;
use crate::domain::{
    DndMode, PreferenceDecision, Severity, User, UserNotificationPreferences, Workflow,
};

pub struct PreferenceFilter {
    users: Arc<dyn UserRepository>,
    timezone: Tz,
    dnd_mode: DndMode,
}

impl PreferenceFilter {
    pub fn new(users: Arc<dyn UserRepository>, timezone: Tz, dnd_mode: DndMode) -> Self {
        Self {
            users,
            timezone,
            dnd_mode,
        }
    }

    /// Decide whether `user` should receive a `severity` alert on `channel_type`.
    pub async fn should_notify(
        &self,
        user: &User,
        channel_type: &str,
        severity: Severity,
        workflow: &Workflow,
        now: DateTime<Utc>,
    ) -> PreferenceDecision {
        if !workflow.use_user_preferences {
            return PreferenceDecision::allow("workflow ignores user preferences");
        }

        let record = match self
            .users
            .get_preferences(&user.id, &workflow.organization_id)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => return PreferenceDecision::allow("no preferences configured"),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Preference lookup failed; allowing");
                return PreferenceDecision::allow(format!("preference lookup failed: {}", e));
            }
        };

        let prefs = match UserNotificationPreferences::try_from(record) {
            Ok(prefs) => prefs,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "Unreadable preferences; allowing");
                return PreferenceDecision::allow(format!("preference lookup failed: {}", e));
            }
        };

        let local_now = now.with_timezone(&self.timezone).naive_local();
        prefs.evaluate(channel_type, severity, local_now, self.dnd_mode)
    }
}
