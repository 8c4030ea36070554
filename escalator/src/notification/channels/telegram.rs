//! Telegram sender.
//!
//! With a `bot_token` in the channel configuration the message goes out via
//! the Bot API (`POST /bot<token>/sendMessage`); 429 handling, including the
//! `parameters.retry_after` field, lives in the HTTP client. Without a token
//! the transport is simulated.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{ChannelSender, DeliveryOutcome, DispatchContext};
use crate::database::models::ChannelType;
use crate::Result;
use crate::domain::Severity;
use crate::notification::transport::HttpClient;

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Cap on the escaped title and workflow name.
const FIELD_LIMIT: usize = 256;

const TRUNCATED_SUFFIX: &str = " [truncated]";

pub struct TelegramSender {
    http: Arc<dyn HttpClient>,
}

impl TelegramSender {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Build the HTML message text for an alert.
    fn build_message(ctx: &DispatchContext<'_>) -> String {
        let emoji = match ctx.event.severity {
            Severity::Low => "\u{2139}\u{fe0f}",
            Severity::Medium => "\u{1f514}",
            Severity::High => "\u{26a0}\u{fe0f}",
            Severity::Critical => "\u{1f6a8}",
        };

        let title = escape_html_truncated(&ctx.event.alert_title(), FIELD_LIMIT);
        let workflow = escape_html_truncated(&ctx.workflow.name, FIELD_LIMIT);
        let render = |description: &str| {
            format!(
                "{emoji} <b>{title}</b>\n\n{description}\n\n<i>Severity: {severity} | Workflow: {workflow}</i>",
                severity = ctx.event.severity.label(),
            )
        };

        // The raw description is cut before escaping so no entity is split.
        let budget = TELEGRAM_MESSAGE_LIMIT.saturating_sub(render("").chars().count());
        render(&escape_html_truncated(&ctx.event.alert_description(), budget))
    }
}

#[async_trait]
impl ChannelSender for TelegramSender {
    fn channel_type(&self) -> &'static str {
        ChannelType::Telegram.as_str()
    }

    async fn send(&self, ctx: &DispatchContext<'_>) -> Result<Vec<DeliveryOutcome>> {
        let Some(chat_id) = ctx.channel.config_value("chat_id") else {
            return Ok(vec![DeliveryOutcome::failed("telegram chat_id not configured")]);
        };
        let text = Self::build_message(ctx);

        let Some(bot_token) = ctx.channel.config_value("bot_token") else {
            info!(chat_id = %chat_id, event_id = %ctx.event.id, "Simulated Telegram delivery");
            return Ok(vec![DeliveryOutcome::sent(json!({
                "chat_id": chat_id,
                "text": text,
                "simulated": true,
            }))]);
        };

        let payload = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
        });
        let url = format!("https://api.telegram.org/bot{}/sendMessage", bot_token);

        let outcome = match self.http.post_json(&url, &[], &payload).await {
            Ok(response) if response.is_success() => {
                debug!(chat_id = %chat_id, "Telegram message sent");
                // The URL carries the token, so only the payload is kept.
                DeliveryOutcome::sent(json!({
                    "payload": payload,
                    "response_status": response.status,
                }))
            }
            Ok(response) => {
                warn!("Telegram sendMessage failed: {} - {}", response.status, response.body);
                DeliveryOutcome::failed(format!(
                    "Telegram sendMessage failed: HTTP {}",
                    response.status
                ))
            }
            Err(e) => DeliveryOutcome::failed(e.to_string().replace(&bot_token, "<redacted>")),
        };
        Ok(vec![outcome])
    }
}

fn escape_char(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

/// HTML-escape `s`, keeping the result within `limit` characters. Whole
/// source characters are dropped from the end, never parts of an entity.
fn escape_html_truncated(s: &str, limit: usize) -> String {
    let width = |c: char| escape_char(c).map_or(1, str::len);
    let budget = if s.chars().map(width).sum::<usize>() <= limit {
        limit
    } else {
        limit.saturating_sub(TRUNCATED_SUFFIX.len())
    };

    let mut out = String::with_capacity(s.len());
    let mut used = 0;
    for c in s.chars() {
        used += width(c);
        if used > budget {
            out.push_str(TRUNCATED_SUFFIX);
            return out;
        }
        match escape_char(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}
