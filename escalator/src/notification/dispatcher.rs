//! Channel registry and dispatcher.
//!
//! The registry maps a channel type tag to its [`ChannelSender`], falling back
//! to [`UnsupportedChannelSender`] for unknown tags. The dispatcher runs the
//! sender under a timeout and hands every outcome to the logger.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::channels::{
    ChannelSender, DeliveryOutcome, DispatchContext, EmailSender, InAppSender, SimulatedSender,
    SlackSender, TelegramSender, UnsupportedChannelSender, WebhookSender, ZapierSender,
};
use super::logger::{LogEntry, NotificationLogger};
use super::preferences::PreferenceFilter;
use super::transport::{EmailTransport, HttpClient};
use crate::database::repositories::UserRepository;

pub struct ChannelRegistry {
    senders: HashMap<&'static str, Arc<dyn ChannelSender>>,
    fallback: Arc<dyn ChannelSender>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Empty registry; every type resolves to the fallback.
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
            fallback: Arc::new(UnsupportedChannelSender),
        }
    }

    /// Registry with a sender for every built-in channel type.
    pub fn standard(
        http: Arc<dyn HttpClient>,
        email: Arc<dyn EmailTransport>,
        preferences: Arc<PreferenceFilter>,
        users: Arc<dyn UserRepository>,
    ) -> Self {
        Self::new()
            .with_sender(Arc::new(EmailSender::new(
                email,
                preferences.clone(),
                users.clone(),
            )))
            .with_sender(Arc::new(WebhookSender::new(http.clone())))
            .with_sender(Arc::new(InAppSender::new(users, preferences)))
            .with_sender(Arc::new(SimulatedSender::sms()))
            .with_sender(Arc::new(SimulatedSender::whatsapp()))
            .with_sender(Arc::new(SimulatedSender::iot_device()))
            .with_sender(Arc::new(SlackSender::new(http.clone())))
            .with_sender(Arc::new(ZapierSender::new(http.clone())))
            .with_sender(Arc::new(TelegramSender::new(http)))
    }

    /// Register `sender` under its channel type, replacing any previous one.
    pub fn register(&mut self, sender: Arc<dyn ChannelSender>) {
        self.senders.insert(sender.channel_type(), sender);
    }

    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.register(sender);
        self
    }

    pub fn sender_for(&self, channel_type: &str) -> &Arc<dyn ChannelSender> {
        self.senders.get(channel_type).unwrap_or(&self.fallback)
    }

    /// Registered channel types, sorted.
    pub fn channel_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.senders.keys().copied().collect();
        types.sort_unstable();
        types
    }
}

pub struct ChannelDispatcher {
    registry: ChannelRegistry,
    logger: Arc<NotificationLogger>,
    /// Zero disables the timeout.
    timeout: Duration,
}

impl ChannelDispatcher {
    pub fn new(registry: ChannelRegistry, logger: Arc<NotificationLogger>, timeout: Duration) -> Self {
        Self {
            registry,
            logger,
            timeout,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Deliver one step to one channel and log every outcome.
    ///
    /// With `notification_id` the first outcome updates that record; further
    /// outcomes (in-app fan-out) are created as new records. Returns the
    /// number of audit records written.
    pub async fn dispatch(&self, ctx: &DispatchContext<'_>, notification_id: Option<&str>) -> usize {
        let outcomes = self.run_sender(ctx).await;

        let mut written = 0;
        for (i, outcome) in outcomes.into_iter().enumerate() {
            let entry = LogEntry::for_channel(ctx.event, ctx.workflow, ctx.channel, ctx.step_index, ctx.now)
                .outcome(outcome)
                .updating(if i == 0 { notification_id } else { None });
            if self.logger.log(entry).await {
                written += 1;
            }
        }
        written
    }

    async fn run_sender(&self, ctx: &DispatchContext<'_>) -> Vec<DeliveryOutcome> {
        let sender = self.registry.sender_for(&ctx.channel.channel_type);
        debug!(
            event_id = %ctx.event.id,
            channel_id = %ctx.channel.id,
            channel_type = %ctx.channel.channel_type,
            step = ctx.step_index,
            "Dispatching"
        );

        let result = if self.timeout.is_zero() {
            sender.send(ctx).await
        } else {
            match tokio::time::timeout(self.timeout, sender.send(ctx)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(channel_id = %ctx.channel.id, "Dispatch timed out");
                    return vec![DeliveryOutcome::failed(format!(
                        "dispatch timed out after {}s",
                        self.timeout.as_secs()
                    ))];
                }
            }
        };

        match result {
            Ok(outcomes) if outcomes.is_empty() => {
                vec![DeliveryOutcome::failed("sender produced no delivery outcome")]
            }
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!(channel_id = %ctx.channel.id, error = %e, "Channel sender failed");
                vec![DeliveryOutcome::failed(e.to_string())]
            }
        }
    }
}
