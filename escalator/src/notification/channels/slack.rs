//! Slack incoming-webhook sender.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::webhook::post_outcome;
use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::domain::Severity;
use crate::notification::transport::HttpClient;

pub struct SlackSender {
    http: Arc<dyn HttpClient>,
}

impl SlackSender {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    fn build_payload(ctx: &DispatchContext<'_>) -> Value {
        let color = match ctx.event.severity {
            Severity::Low => "#439FE0",
            Severity::Medium => "#FFCC00",
            Severity::High => "#FF9900",
            Severity::Critical => "#D00000",
        };

        json!({
            "text": format!("*{}*", ctx.event.alert_title()),
            "attachments": [{
                "color": color,
                "text": ctx.event.alert_description(),
                "fields": [
                    {"title": "Severity", "value": ctx.event.severity.label(), "short": true},
                    {"title": "Workflow", "value": ctx.workflow.name, "short": true},
                    {"title": "Zone", "value": ctx.event.zone_name.as_deref().unwrap_or("-"), "short": true},
                    {"title": "Confidence", "value": format!("{:.0}%", ctx.event.confidence * 100.0), "short": true},
                ],
                "ts": ctx.event.created_at.timestamp(),
            }],
        })
    }
}

#[async_trait]
impl ChannelSender for SlackSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::Slack.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(url) = ctx.channel.config_value("webhook_url") else {
            return Ok(vec![DeliveryOutcome::failed("slack webhook_url not configured")]);
        };

        let outcome =
            post_outcome(self.http.as_ref(), "slack", &url, &[], Self::build_payload(ctx)).await;
        Ok(vec![outcome])
    }
}
