//! `send-notification` action.

use serde::{Deserialize, Serialize};

use super::dispatcher::{ActionDispatcher, Outcome};
use crate::collaborators::Notification;
use crate::error::ActionError;

/// Recipients as a list or a comma-separated string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipients {
    List(Vec<String>),
    Joined(String),
}

impl Default for Recipients {
    fn default() -> Self {
        Recipients::List(Vec::new())
    }
}

impl Recipients {
    /// Flatten into trimmed, non-empty addresses.
    pub fn into_vec(self) -> Vec<String> {
        let items = match self {
            Recipients::List(items) => items,
            Recipients::Joined(s) => s.split(',').map(str::to_string).collect(),
        };
        items
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }
}

/// Config of a `send-notification` action.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationConfig {
    #[serde(default, alias = "template")]
    pub message: String,

    #[serde(default)]
    pub recipients: Recipients,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Hands the message to the notification sender. Delivery problems are
/// logged but never fail the action.
pub(super) async fn run(
    dispatcher: &ActionDispatcher<'_>,
    config: NotificationConfig,
) -> Result<Outcome, ActionError> {
    let scope = dispatcher.scope();
    let recipients = config.recipients.into_vec();

    let notification = Notification {
        recipients: recipients.clone(),
        subject: config.subject,
        message: config.message.clone(),
        channel: config.channel,
        rule_id: scope.rule_id().to_string(),
        user_id: scope.user_id().to_string(),
    };

    let delivered = match dispatcher.engine().notification_sender().send(notification).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(rule_id = %scope.rule_id(), error = %e, "Notification hand-off failed");
            false
        }
    };

    Ok(Outcome::success(serde_json::json!({
        "message": config.message,
        "recipients": recipients,
        "delivered": delivered,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients_forms() {
        let joined: Recipients = serde_json::from_value(serde_json::json!("a@x.com, b@x.com,")).unwrap();
        assert_eq!(joined.into_vec(), vec!["a@x.com", "b@x.com"]);

        let list: Recipients = serde_json::from_value(serde_json::json!(["c@x.com"])).unwrap();
        assert_eq!(list.into_vec(), vec!["c@x.com"]);
    }
}
