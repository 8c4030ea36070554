//! Email sender.
//!
//! The recipient is matched against the organization's users so that user's
//! preferences apply; addresses that belong to no user are delivered
//! unfiltered.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::database::repositories::UserRepository;
use crate::domain::User;
use crate::notification::preferences::PreferenceFilter;
use crate::notification::transport::{EmailMessage, EmailTransport};

pub struct EmailSender {
    transport: Arc<dyn EmailTransport>,
    preferences: Arc<PreferenceFilter>,
    users: Arc<dyn UserRepository>,
}

impl EmailSender {
    pub fn new(
        transport: Arc<dyn EmailTransport>,
        preferences: Arc<PreferenceFilter>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            transport,
            preferences,
            users,
        }
    }

    fn build_message(ctx: &DispatchContext<'_>, to: &str) -> EmailMessage {
        let body = format!(
            "{text}\n\nCamera: {camera}\nEvent type: {event_type}\nWorkflow: {workflow}\nDetected at: {time}\nEvent ID: {event_id}",
            text = ctx.alert_text(),
            camera = ctx.event.camera_name,
            event_type = ctx.event.event_type,
            workflow = ctx.workflow.name,
            time = ctx.event.created_at.to_rfc3339(),
            event_id = ctx.event.id,
        );

        EmailMessage {
            to: to.to_string(),
            subject: ctx.event.alert_title(),
            body,
        }
    }

    /// The organization member owning `address`, if any. Lookup errors
    /// resolve to no user.
    async fn resolve_recipient(&self, organization_id: &str, address: &str) -> Option<User> {
        match self.users.find_user_by_email(organization_id, address).await {
            Ok(user) => user.map(User::from),
            Err(e) => {
                warn!(error = %e, "Email recipient lookup failed; sending without preference check");
                None
            }
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::Email.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(address) = ctx.channel.config_value("email_address") else {
            return Ok(vec![DeliveryOutcome::failed("email address not configured")]);
        };

        let recipient = self
            .resolve_recipient(&ctx.event.organization_id, &address)
            .await;

        if let Some(user) = &recipient {
            let decision = self
                .preferences
                .should_notify(user, "email", ctx.event.severity, ctx.workflow, ctx.now)
                .await;
            if !decision.allow {
                debug!(user_id = %user.id, reason = %decision.reason, "Email suppressed by preferences");
                return Ok(vec![DeliveryOutcome::skipped(decision.reason).for_user(&user.id)]);
            }
        }

        let message = Self::build_message(ctx, &address);
        let outcome = match self.transport.send_email(&message).await {
            Ok(()) => DeliveryOutcome::sent(json!({
                "recipient": message.to,
                "subject": message.subject,
                "body": message.body,
            })),
            Err(e) => {
                warn!(to = %address, error = %e, "Email delivery failed");
                DeliveryOutcome::failed(e.to_string())
            }
        };

        Ok(vec![match recipient {
            Some(user) => outcome.for_user(user.id),
            None => outcome,
        }])
    }
}
