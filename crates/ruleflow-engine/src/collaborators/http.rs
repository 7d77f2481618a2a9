//! HTTP webhook caller.

use std::time::Duration;

use async_trait::async_trait;

use super::{WebhookCaller, WebhookRequest, WebhookResponse};
use crate::error::CollaboratorError;

/// Webhook caller backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpWebhookCaller {
    client: reqwest::Client,
}

impl HttpWebhookCaller {
    /// Create a caller with the given request timeout.
    pub fn new(timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Webhook client build failed, falling back to defaults");
                reqwest::Client::new()
            }
        };

        Self { client }
    }

    /// Create a caller with a custom client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpWebhookCaller {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl WebhookCaller for HttpWebhookCaller {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookResponse, CollaboratorError> {
        let start = std::time::Instant::now();

        let mut builder = self.client.request(request.method.into(), &request.url);

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(ref payload) = request.payload {
            builder = match payload {
                serde_json::Value::String(s) => builder.body(s.clone()),
                _ => builder.json(payload),
            };
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // JSON when possible, raw text otherwise
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(serde_json::json!(text));

        tracing::debug!(
            url = %request.url,
            status,
            duration_ms = start.elapsed().as_millis() as u64,
            "Webhook call finished"
        );

        Ok(WebhookResponse { status, body })
    }
}
