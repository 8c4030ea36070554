//! Outbound transports used by the channel senders.
//!
//! Senders never talk to reqwest or lettre directly; they go through
//! [`HttpClient`] and [`EmailTransport`] so tests can substitute fakes.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::utils::http_client::build_client;
use crate::{Error, Result};

/// Upper bound on a single rate-limit wait, whatever the server asks for.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// Response of an HTTP POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Generic HTTP POST client for webhook-style channels.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// POST `body` as JSON. Non-2xx responses are returned, not raised;
    /// only connection-level failures are errors.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<HttpResponse>;
}

/// reqwest-backed [`HttpClient`] with bounded retries on HTTP 429.
pub struct ReqwestHttpClient {
    client: Client,
    max_rate_limit_retries: u32,
}

impl ReqwestHttpClient {
    pub fn new(request_timeout: Duration, max_rate_limit_retries: u32) -> Self {
        Self {
            client: build_client(request_timeout),
            max_rate_limit_retries,
        }
    }

    fn build_headers(headers: &[(String, String)]) -> reqwest::header::HeaderMap {
        let mut map = reqwest::header::HeaderMap::new();
        for (name, value) in headers {
            match (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => warn!(header = %name, "Ignoring invalid HTTP header"),
            }
        }
        map
    }
}

/// Seconds to wait before retrying a 429, from the `Retry-After` header or
/// a Telegram-style `parameters.retry_after` body field.
fn retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(secs) = header.and_then(|h| h.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    serde_json::from_str::<Value>(body)
        .ok()?
        .get("parameters")?
        .get("retry_after")?
        .as_u64()
        .map(Duration::from_secs)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> Result<HttpResponse> {
        let header_map = Self::build_headers(headers);
        let mut attempts = 0;

        loop {
            attempts += 1;

            let response = self
                .client
                .post(url)
                .headers(header_map.clone())
                .json(body)
                .send()
                .await
                .map_err(|e| Error::transport(format!("HTTP request failed: {}", e)))?;

            let status = response.status().as_u16();
            let retry_header = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response.text().await.unwrap_or_default();

            if status != 429 {
                return Ok(HttpResponse { status, body: text });
            }

            let wait = retry_after(retry_header.as_deref(), &text);
            if attempts > self.max_rate_limit_retries {
                warn!(
                    "HTTP rate limit: max retries ({}) exceeded, last retry_after was {:?}",
                    self.max_rate_limit_retries, wait
                );
                return Err(Error::transport(format!(
                    "rate limit exceeded after {} retries",
                    self.max_rate_limit_retries
                )));
            }

            let wait = wait.unwrap_or(Duration::from_secs(1)).min(MAX_RATE_LIMIT_WAIT);
            debug!(
                "Rate limited (429), waiting {:?} before retry (attempt {}/{})",
                wait, attempts, self.max_rate_limit_retries
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// An outbound email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Generic "send email" function.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_email(&self, message: &EmailMessage) -> Result<()>;
}

/// SMTP relay transport built on lettre.
pub struct SmtpEmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpEmailTransport {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .map_err(|e| Error::config(format!("invalid SMTP sender '{}': {}", from, e)))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| Error::config(format!("invalid SMTP relay '{}': {}", host, e)))?
            .port(port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| Error::transport(format!("invalid recipient '{}': {}", message.to, e)))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| Error::transport(format!("failed to build email: {}", e)))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| Error::transport(format!("SMTP send failed: {}", e)))?;

        debug!(to = %message.to, "Email sent via SMTP");
        Ok(())
    }
}

/// Transport used when no SMTP relay is configured: the message is only logged.
#[derive(Debug, Default)]
pub struct LogEmailTransport;

#[async_trait]
impl EmailTransport for LogEmailTransport {
    async fn send_email(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "SMTP not configured; email logged instead of sent"
        );
        Ok(())
    }
}
