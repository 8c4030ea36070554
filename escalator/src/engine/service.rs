//! Escalation engine service.
//!
//! Entry points:
//! - [`EscalationEngine::process_event`]: match a new event against the
//!   organization's workflows and run their escalation policies
//! - [`EscalationEngine::process_due`]: dispatch delayed steps that are due
//!
//! Processing is sequential (workflow, then step, then channel) so the audit
//! trail of one event has a deterministic order. Failures are contained at
//! each of those boundaries and end up as `failed` audit records; neither
//! entry point returns an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::queue::DelayedDispatchQueue;
use crate::config::EngineConfig;
use crate::database::models::NotificationDbModel;
use crate::database::repositories::Repositories;
use crate::domain::{Channel, EscalationStep, Event, StepTiming, Workflow};
use crate::notification::channels::{DeliveryOutcome, DispatchContext};
use crate::notification::dispatcher::{ChannelDispatcher, ChannelRegistry};
use crate::notification::logger::{LogEntry, NotificationLogger};
use crate::notification::preferences::PreferenceFilter;
use crate::notification::transport::{EmailTransport, HttpClient};
use crate::{Error, Result};

/// Reason recorded when a step names a channel that cannot be used.
const CHANNEL_UNAVAILABLE: &str = "channel inactive or missing";

/// Notification type recorded for channels that could not be loaded.
const UNKNOWN_CHANNEL_TYPE: &str = "unknown";

/// Result of [`EscalationEngine::process_event`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub workflows_matched: usize,
    /// Audit records written, pending ones included.
    pub records_written: usize,
    /// Pending records created for delayed steps.
    pub scheduled: usize,
}

/// Result of [`EscalationEngine::process_due`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub claimed: usize,
    /// Records handed back to their channel sender.
    pub dispatched: usize,
    /// Records moved to `failed` without dispatch.
    pub failed: usize,
    /// Records left alone because another sweep finished or re-claimed them.
    pub lease_lost: usize,
}

/// How a channel id of a step resolved.
enum ChannelLookup {
    Usable(Channel),
    Unavailable { notification_type: String },
}

pub struct EscalationEngine {
    repos: Repositories,
    dispatcher: ChannelDispatcher,
    logger: Arc<NotificationLogger>,
    queue: DelayedDispatchQueue,
    config: EngineConfig,
}

impl EscalationEngine {
    /// Engine dispatching through `registry`.
    pub fn new(repos: Repositories, registry: ChannelRegistry, config: EngineConfig) -> Self {
        let logger = Arc::new(NotificationLogger::new(repos.notifications.clone()));
        let dispatcher = ChannelDispatcher::new(registry, logger.clone(), config.dispatch_timeout);
        let queue = DelayedDispatchQueue::new(repos.notifications.clone(), config.claim_timeout);

        Self {
            repos,
            dispatcher,
            logger,
            queue,
            config,
        }
    }

    /// Engine with the standard channel registry over the given transports.
    pub fn with_transports(
        repos: Repositories,
        http: Arc<dyn HttpClient>,
        email: Arc<dyn EmailTransport>,
        config: EngineConfig,
    ) -> Self {
        let preferences = Arc::new(PreferenceFilter::new(
            repos.users.clone(),
            config.dnd_timezone,
            config.dnd_mode,
        ));
        let registry = ChannelRegistry::standard(http, email, preferences, repos.users.clone());
        Self::new(repos, registry, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ChannelRegistry {
        self.dispatcher.registry()
    }

    pub async fn process_event(&self, event: &Event) -> ProcessSummary {
        self.process_event_at(event, Utc::now()).await
    }

    /// [`process_event`](Self::process_event) with an explicit clock.
    pub async fn process_event_at(&self, event: &Event, now: DateTime<Utc>) -> ProcessSummary {
        let mut summary = ProcessSummary::default();

        let workflows = match self
            .repos
            .workflows
            .list_active_workflows(&event.organization_id)
            .await
        {
            Ok(workflows) => workflows,
            Err(e) => {
                error!(event_id = %event.id, error = %e, "Failed to load workflows");
                return summary;
            }
        };

        for model in workflows {
            let workflow_id = model.id.clone();
            let workflow = match Workflow::try_from(model) {
                Ok(workflow) => workflow,
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "Skipping malformed workflow");
                    continue;
                }
            };

            if !workflow.is_active || !workflow.matches(event) {
                continue;
            }

            summary.workflows_matched += 1;
            debug!(event_id = %event.id, workflow_id = %workflow.id, "Workflow matched");

            for step in workflow.escalation_policy.steps() {
                for channel_id in &step.channel_ids {
                    self.run_channel(event, &workflow, step, channel_id, now, &mut summary)
                        .await;
                }
            }
        }

        info!(
            event_id = %event.id,
            workflows_matched = summary.workflows_matched,
            records_written = summary.records_written,
            scheduled = summary.scheduled,
            "Event processed"
        );
        summary
    }

    /// Handle one channel of one step. Never fails; every path ends in at
    /// most one log call per outcome.
    async fn run_channel(
        &self,
        event: &Event,
        workflow: &Workflow,
        step: &EscalationStep,
        channel_id: &str,
        now: DateTime<Utc>,
        summary: &mut ProcessSummary,
    ) {
        let channel = match self.lookup_channel(channel_id, &event.organization_id).await {
            Ok(ChannelLookup::Usable(channel)) => channel,
            Ok(ChannelLookup::Unavailable { notification_type }) => {
                debug!(channel_id = %channel_id, step = step.index, "Channel inactive or missing");
                let entry = LogEntry::for_channel_id(event, workflow, channel_id, &notification_type, step.index, now)
                    .outcome(DeliveryOutcome::skipped(CHANNEL_UNAVAILABLE));
                self.count(self.logger.log(entry).await, summary);
                return;
            }
            Err(e) => {
                warn!(channel_id = %channel_id, error = %e, "Failed to load channel");
                let entry = LogEntry::for_channel_id(event, workflow, channel_id, UNKNOWN_CHANNEL_TYPE, step.index, now)
                    .outcome(DeliveryOutcome::failed(format!("failed to load channel: {}", e)));
                self.count(self.logger.log(entry).await, summary);
                return;
            }
        };

        match step.timing {
            StepTiming::Immediate => {
                let ctx = DispatchContext {
                    event,
                    workflow,
                    channel: &channel,
                    step_index: step.index,
                    now,
                };
                summary.records_written += self.dispatcher.dispatch(&ctx, None).await;
            }
            StepTiming::OutOfRange(delay_minutes) => {
                warn!(
                    workflow_id = %workflow.id,
                    step = step.index,
                    delay_minutes,
                    "Escalation step delay out of range"
                );
                let entry = LogEntry::for_channel(event, workflow, &channel, step.index, now).outcome(
                    DeliveryOutcome::failed(format!(
                        "escalation step {} delay_minutes out of range ({})",
                        step.index, delay_minutes
                    )),
                );
                self.count(self.logger.log(entry).await, summary);
            }
            StepTiming::DelayedBy(delay) => {
                match self
                    .queue
                    .schedule(event, workflow, &channel, step.index, delay, now)
                    .await
                {
                    Ok(_) => {
                        summary.records_written += 1;
                        summary.scheduled += 1;
                    }
                    Err(e) => {
                        error!(channel_id = %channel.id, error = %e, "Failed to schedule escalation step");
                        let entry = LogEntry::for_channel(event, workflow, &channel, step.index, now)
                            .outcome(DeliveryOutcome::failed(format!(
                                "failed to schedule escalation step: {}",
                                e
                            )));
                        self.count(self.logger.log(entry).await, summary);
                    }
                }
            }
        }
    }

    fn count(&self, written: bool, summary: &mut ProcessSummary) {
        if written {
            summary.records_written += 1;
        }
    }

    /// Resolve a channel id. Missing, inactive and foreign channels are
    /// unavailable; store and parse failures are errors.
    async fn lookup_channel(&self, channel_id: &str, organization_id: &str) -> Result<ChannelLookup> {
        let model = match self.repos.channels.get_channel(channel_id).await {
            Ok(model) => model,
            Err(e) if e.is_not_found() => {
                return Ok(ChannelLookup::Unavailable {
                    notification_type: UNKNOWN_CHANNEL_TYPE.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let channel = Channel::try_from(model)?;
        if !channel.is_active || channel.organization_id != organization_id {
            return Ok(ChannelLookup::Unavailable {
                notification_type: channel.channel_type,
            });
        }
        Ok(ChannelLookup::Usable(channel))
    }

    pub async fn process_due(&self) -> SweepSummary {
        self.process_due_at(Utc::now()).await
    }

    /// [`process_due`](Self::process_due) with an explicit clock.
    pub async fn process_due_at(&self, now: DateTime<Utc>) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let claimed = match self
            .queue
            .claim_due(now, self.config.sweep_batch_size)
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "Failed to claim due escalation steps");
                return summary;
            }
        };
        summary.claimed = claimed.len();
        let started = tokio::time::Instant::now();

        for record in &claimed {
            // Leases were taken for the whole batch at `now`; each record is
            // re-checked and extended right before it is worked on.
            let record_now = now + chrono::Duration::from_std(started.elapsed()).unwrap_or_default();
            match self.queue.renew(record, record_now).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(notification_id = %record.id, "Lease lost before dispatch; skipping");
                    summary.lease_lost += 1;
                    continue;
                }
                Err(e) => {
                    error!(notification_id = %record.id, error = %e, "Failed to renew lease; skipping");
                    summary.lease_lost += 1;
                    continue;
                }
            }

            match self.process_claimed(record, record_now).await {
                Ok(true) => summary.dispatched += 1,
                Ok(false) => summary.failed += 1,
                Err(e) => {
                    error!(notification_id = %record.id, error = %e, "Failed to process due escalation step");
                    self.fail_record(&record.id, format!("escalation processing failed: {}", e), record_now)
                        .await;
                    summary.failed += 1;
                }
            }
        }

        if summary.claimed > 0 {
            info!(
                claimed = summary.claimed,
                dispatched = summary.dispatched,
                failed = summary.failed,
                lease_lost = summary.lease_lost,
                "Due escalation steps processed"
            );
        }
        summary
    }

    /// Dispatch one claimed record. `Ok(false)` means a reference was
    /// missing and the record was failed in place.
    async fn process_claimed(&self, record: &NotificationDbModel, now: DateTime<Utc>) -> Result<bool> {
        let Some(event) = self.resolve(self.repos.events.get_event(&record.event_id).await)? else {
            self.fail_record(&record.id, format!("event {} not found", record.event_id), now)
                .await;
            return Ok(false);
        };
        let event = Event::try_from(event)?;

        let Some(workflow) = self
            .resolve(self.repos.workflows.get_workflow(&record.workflow_id).await)?
        else {
            self.fail_record(&record.id, format!("workflow {} not found", record.workflow_id), now)
                .await;
            return Ok(false);
        };
        let workflow = Workflow::try_from(workflow)?;

        let Some(channel) = self
            .resolve(self.repos.channels.get_channel(&record.channel_id).await)?
        else {
            self.fail_record(&record.id, format!("channel {} not found", record.channel_id), now)
                .await;
            return Ok(false);
        };
        let channel = Channel::try_from(channel)?;
        if !channel.is_active {
            self.fail_record(&record.id, format!("channel {} is inactive", channel.id), now)
                .await;
            return Ok(false);
        }

        let step_index = usize::try_from(record.escalation_step)
            .map_err(|_| Error::validation(format!("invalid escalation_step {}", record.escalation_step)))?;
        let ctx = DispatchContext {
            event: &event,
            workflow: &workflow,
            channel: &channel,
            step_index,
            now,
        };
        self.dispatcher.dispatch(&ctx, Some(&record.id)).await;
        Ok(true)
    }

    /// Turn NotFound into `None`, keeping other errors.
    fn resolve<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fail_record(&self, notification_id: &str, reason: String, now: DateTime<Utc>) {
        if let Err(e) = self.queue.fail(notification_id, reason.as_str(), now).await {
            if e.is_conflict() {
                warn!(notification_id = %notification_id, error = %e, "Lease lost; failure not recorded");
                return;
            }
            error!(
                notification_id = %notification_id,
                error = %e,
                "CRITICAL: failed to mark escalation step as failed"
            );
        } else {
            warn!(notification_id = %notification_id, reason = %reason, "Escalation step failed");
        }
    }
}
