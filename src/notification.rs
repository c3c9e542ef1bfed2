use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::info;

use crate::error::CostNotifierError;

// Embeds the webhook secret; Debug and Display redact the path.
#[derive(Clone, PartialEq)]
pub struct WebhookUrl(Url);

impl WebhookUrl {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw.trim()).map_err(|e| format!("not a URL ({})", e))?;
        if url.scheme() != "https" {
            return Err(format!("scheme must be https, got {}", url.scheme()));
        }
        if url.host_str().is_none() {
            return Err("missing host".to_string());
        }
        Ok(WebhookUrl(url))
    }

    #[cfg(test)]
    pub(crate) fn unchecked(url: Url) -> Self {
        WebhookUrl(url)
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Debug for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "WebhookUrl({})", self)
    }
}

impl fmt::Display for WebhookUrl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}/***", self.0.scheme(), self.0.host_str().unwrap_or("?"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub text: String,
    pub destination: WebhookUrl,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

// Not idempotent: every call delivers a copy.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, message: &NotificationMessage) -> Result<(), CostNotifierError>;
}

pub struct WebhookSender {
    client: Client,
}

#[async_trait]
impl NotificationChannel for WebhookSender {
    async fn send(&self, message: &NotificationMessage) -> Result<(), CostNotifierError> {
        let response = self
            .client
            .post(message.destination.as_url().clone())
            .json(&WebhookPayload {
                text: &message.text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CostNotifierError::DeliveryFailed(format!(
                "webhook answered {}",
                status
            )));
        }
        info!(status = status.as_u16(), "notification delivered");
        Ok(())
    }
}

impl WebhookSender {
    pub fn new(request_timeout: Duration) -> Result<Self, CostNotifierError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self::new_with_client(client))
    }

    pub fn new_with_client(client: Client) -> Self {
        WebhookSender { client }
    }
}
