//! Generic webhook sender.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::notification::transport::HttpClient;

/// Longest response body excerpt kept in a delivery error.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// POST `payload` and turn the response into an outcome.
///
/// 2xx is `sent` with the request and response status as content; any other
/// status or a transport error is `failed`.
pub(super) async fn post_outcome(
    http: &dyn HttpClient,
    label: &str,
    url: &str,
    headers: &[(String, String)],
    payload: Value,
) -> DeliveryOutcome {
    match http.post_json(url, headers, &payload).await {
        Ok(response) if response.is_success() => {
            debug!(url = %url, status = response.status, "{} delivered", label);
            DeliveryOutcome::sent(json!({
                "url": url,
                "payload": payload,
                "response_status": response.status,
            }))
        }
        Ok(response) => {
            let body: String = response.body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(url = %url, status = response.status, "{} rejected", label);
            DeliveryOutcome::failed(format!(
                "{} returned HTTP {}: {}",
                label, response.status, body
            ))
        }
        Err(e) => {
            warn!(url = %url, error = %e, "{} request failed", label);
            DeliveryOutcome::failed(e.to_string())
        }
    }
}

pub struct WebhookSender {
    http: Arc<dyn HttpClient>,
}

impl WebhookSender {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelSender for WebhookSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::Webhook.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(url) = ctx.channel.config_value("url") else {
            return Ok(vec![DeliveryOutcome::failed("webhook url not configured")]);
        };
        let headers = ctx.channel.config_headers("headers");

        let outcome =
            post_outcome(self.http.as_ref(), "webhook", &url, &headers, ctx.alert_payload()).await;
        Ok(vec![outcome])
    }
}
