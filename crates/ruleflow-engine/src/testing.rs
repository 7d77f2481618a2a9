//! Test doubles for the engine's collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::collaborators::{
    ModelExecutor, ModelRequest, Notification, NotificationSender, WebhookCaller,
    WebhookRequest, WebhookResponse,
};
use crate::error::CollaboratorError;

/// Returns the request input as the model output.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoModel;

#[async_trait]
impl ModelExecutor for EchoModel {
    async fn execute(&self, request: ModelRequest) -> Result<Value, CollaboratorError> {
        Ok(json!({"echo": request.input, "model": request.model_id}))
    }
}

/// Sleeps for `input.delay_ms` and records the peak number of concurrent calls.
#[derive(Debug, Default, Clone)]
pub struct SlowModel {
    current: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelExecutor for SlowModel {
    async fn execute(&self, request: ModelRequest) -> Result<Value, CollaboratorError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = request.input["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"slept_ms": delay}))
    }
}

/// Panics on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingModel;

#[async_trait]
impl ModelExecutor for PanickingModel {
    async fn execute(&self, _request: ModelRequest) -> Result<Value, CollaboratorError> {
        panic!("model exploded");
    }
}

/// Records every notification it is handed.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    pub sent: Arc<Mutex<Vec<Notification>>>,
}

#[async_trait]
impl NotificationSender for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), CollaboratorError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Fails every delivery.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

#[async_trait]
impl NotificationSender for FailingNotifier {
    async fn send(&self, _notification: Notification) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Failed("smtp unavailable".to_string()))
    }
}

/// Answers every call with a fixed status and records the requests.
#[derive(Debug, Clone)]
pub struct MockWebhook {
    status: u16,
    pub calls: Arc<Mutex<Vec<WebhookRequest>>>,
}

impl MockWebhook {
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl WebhookCaller for MockWebhook {
    async fn call(&self, request: WebhookRequest) -> Result<WebhookResponse, CollaboratorError> {
        self.calls.lock().unwrap().push(request);
        Ok(WebhookResponse {
            status: self.status,
            body: json!({"ok": self.status < 300}),
        })
    }
}
