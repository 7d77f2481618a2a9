//! Seams to the systems the engine drives but does not own.
//!
//! - `ModelExecutor` - runs a model for `trigger-model`
//! - `NotificationSender` - delivers messages for `send-notification`
//! - `WebhookCaller` - performs HTTP calls for `call-webhook`
//! - `RuleStore` - looks up rules for `trigger-rule` and `run_by_id`

mod http;
mod store;

pub use self::http::HttpWebhookCaller;
pub use self::store::InMemoryRuleStore;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CollaboratorError;
use crate::rule::Rule;

/// Request to run a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    pub model_id: String,
    pub input: Value,
    pub rule_id: String,
    pub user_id: String,
}

/// Runs models on behalf of `trigger-model` actions.
#[async_trait]
pub trait ModelExecutor: Send + Sync {
    async fn execute(&self, request: ModelRequest) -> Result<Value, CollaboratorError>;
}

/// Model executor used when none is wired in. Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredModelExecutor;

#[async_trait]
impl ModelExecutor for UnconfiguredModelExecutor {
    async fn execute(&self, _request: ModelRequest) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotConfigured("model executor"))
    }
}

/// Message handed to the notification transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub rule_id: String,
    pub user_id: String,
}

/// Delivers notifications. Delivery outcome is the sender's concern.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorError>;
}

/// Notification sender that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorError> {
        tracing::info!(
            rule_id = %notification.rule_id,
            recipients = ?notification.recipients,
            channel = notification.channel.as_deref().unwrap_or("default"),
            message = %notification.message,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[allow(clippy::upper_case_acronyms)] // HTTP methods are conventionally uppercase
pub enum HttpMethod {
    GET,
    #[default]
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => reqwest::Method::GET,
            HttpMethod::POST => reqwest::Method::POST,
            HttpMethod::PUT => reqwest::Method::PUT,
            HttpMethod::PATCH => reqwest::Method::PATCH,
            HttpMethod::DELETE => reqwest::Method::DELETE,
        }
    }
}

/// Outbound webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub url: String,

    /// HTTP method (default: POST).
    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, alias = "body", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Response of a webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: u16,
    #[serde(default)]
    pub body: Value,
}

impl WebhookResponse {
    /// Returns true for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Performs outbound HTTP calls for `call-webhook` actions.
#[async_trait]
pub trait WebhookCaller: Send + Sync {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookResponse, CollaboratorError>;
}

/// Looks up rules by id.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, CollaboratorError>;
}
