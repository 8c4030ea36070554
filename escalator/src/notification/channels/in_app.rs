//! In-app sender: one notification per organization user.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::database::repositories::UserRepository;
use crate::domain::User;
use crate::notification::preferences::PreferenceFilter;

pub struct InAppSender {
    users: Arc<dyn UserRepository>,
    preferences: Arc<PreferenceFilter>,
}

impl InAppSender {
    pub fn new(users: Arc<dyn UserRepository>, preferences: Arc<PreferenceFilter>) -> Self {
        Self { users, preferences }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::InApp.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let users = self.users.list_users(&ctx.event.organization_id).await?;
        if users.is_empty() {
            return Ok(vec![DeliveryOutcome::skipped("no users in organization")]);
        }

        let mut outcomes = Vec::with_capacity(users.len());
        for user in users.into_iter().map(User::from) {
            let decision = self
                .preferences
                .should_notify(&user, "in_app", ctx.event.severity, ctx.workflow, ctx.now)
                .await;

            let outcome = if decision.allow {
                DeliveryOutcome::sent(json!({
                    "title": ctx.event.alert_title(),
                    "description": ctx.event.alert_description(),
                    "severity": ctx.event.severity.as_str(),
                    "event_id": ctx.event.id,
                }))
            } else {
                debug!(user_id = %user.id, reason = %decision.reason, "In-app alert suppressed");
                DeliveryOutcome::skipped(decision.reason)
            };
            outcomes.push(outcome.for_user(user.id));
        }

        Ok(outcomes)
    }
}
