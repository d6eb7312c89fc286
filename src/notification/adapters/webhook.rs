//! JSON webhook delivery channel.

use crate::notification::domain::NotificationPayload;
use crate::notification::ports::{NotificationSender, SenderError};
use async_trait::async_trait;
use reqwest::Client;

/// Longest response body kept in a rejection error.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Posts each payload as JSON to a fixed URL.
///
/// Any 2xx response counts as delivered. The dispatcher bounds every call
/// with its own timeout, so the client carries none.
#[derive(Debug, Clone)]
pub struct WebhookSender {
    name: String,
    url: String,
    client: Client,
}

impl WebhookSender {
    /// Creates a sender named `name` posting to `url`.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::with_client(name, url, Client::new())
    }

    /// Creates a sender that reuses an existing HTTP client.
    #[must_use]
    pub fn with_client(name: impl Into<String>, url: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), SenderError> {
        let response = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|err| SenderError::Transport(err.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SenderError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        })
    }
}
