//! Zapier catch-hook sender.

use std::sync::Arc;

use async_trait::async_trait;

use super::webhook::post_outcome;
use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::notification::transport::HttpClient;

pub struct ZapierSender {
    http: Arc<dyn HttpClient>,
}

impl ZapierSender {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelSender for ZapierSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::Zapier.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(url) = ctx.channel.config_value("zapier_webhook_url") else {
            return Ok(vec![DeliveryOutcome::failed(
                "zapier_webhook_url not configured",
            )]);
        };

        let outcome =
            post_outcome(self.http.as_ref(), "zapier", &url, &[], ctx.alert_payload()).await;
        Ok(vec![outcome])
    }
}
