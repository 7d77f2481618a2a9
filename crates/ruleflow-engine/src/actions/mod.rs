//! Rule actions.
//!
//! An action definition carries its type as a string. The string is mapped
//! once onto the closed [`ActionKind`] set; after template resolution the
//! config is parsed into the typed [`Action`] for that kind. Types without a
//! builtin behavior map to [`ActionKind::Unsupported`].

mod chain;
mod conditional;
mod data;
mod dispatcher;
mod model;
mod notify;
mod webhook;

pub use self::chain::TriggerRuleConfig;
pub use self::conditional::ConditionalConfig;
pub use self::data::{StoreDataConfig, TransformConfig, TransformOperation, TransformSpec};
pub use self::dispatcher::ActionDispatcher;
pub use self::model::TriggerModelConfig;
pub use self::notify::{NotificationConfig, Recipients};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collaborators::WebhookRequest;
use crate::error::ActionError;

/// What to do with the rest of a sequential run after this action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStrategy {
    #[default]
    Stop,
    Continue,
}

/// Per-action error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorHandling {
    #[serde(default)]
    pub strategy: ErrorStrategy,
}

/// Authored action as stored in the rule document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub id: String,

    #[serde(rename = "type")]
    pub action_type: String,

    #[serde(default)]
    pub config: Value,

    #[serde(default)]
    pub error_handling: ErrorHandling,

    /// Variable that receives this action's output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_variable: Option<String>,
}

impl ActionDefinition {
    /// Create an action definition with default error handling.
    pub fn new(id: impl Into<String>, action_type: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            action_type: action_type.into(),
            config,
            error_handling: ErrorHandling::default(),
            output_variable: None,
        }
    }

    /// Set the error strategy.
    pub fn with_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.error_handling.strategy = strategy;
        self
    }

    /// Set the output variable.
    pub fn with_output_variable(mut self, name: impl Into<String>) -> Self {
        self.output_variable = Some(name.into());
        self
    }

    /// Kind of this action.
    pub fn kind(&self) -> ActionKind {
        ActionKind::from_type(&self.action_type)
    }

    /// Returns true if a failure of this action ends a sequential run.
    pub fn stops_on_failure(&self) -> bool {
        self.error_handling.strategy == ErrorStrategy::Stop
    }
}

/// Closed set of builtin action kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    TriggerModel,
    SendNotification,
    CallWebhook,
    StoreData,
    TransformData,
    Conditional,
    TriggerRule,
    Unsupported(String),
}

impl ActionKind {
    /// Map a declared type string onto a kind.
    pub fn from_type(action_type: &str) -> Self {
        match action_type {
            "trigger-model" => ActionKind::TriggerModel,
            "send-notification" => ActionKind::SendNotification,
            "call-webhook" => ActionKind::CallWebhook,
            "store-data" => ActionKind::StoreData,
            "transform-data" => ActionKind::TransformData,
            "conditional" | "conditional-action" => ActionKind::Conditional,
            "trigger-rule" => ActionKind::TriggerRule,
            other => ActionKind::Unsupported(other.to_string()),
        }
    }

    /// Canonical type string.
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::TriggerModel => "trigger-model",
            ActionKind::SendNotification => "send-notification",
            ActionKind::CallWebhook => "call-webhook",
            ActionKind::StoreData => "store-data",
            ActionKind::TransformData => "transform-data",
            ActionKind::Conditional => "conditional-action",
            ActionKind::TriggerRule => "trigger-rule",
            ActionKind::Unsupported(name) => name,
        }
    }
}

/// Action with a typed, template-resolved configuration.
#[derive(Debug, Clone)]
pub enum Action {
    TriggerModel(TriggerModelConfig),
    SendNotification(NotificationConfig),
    CallWebhook(WebhookRequest),
    StoreData(StoreDataConfig),
    TransformData(TransformConfig),
    Conditional(Box<ConditionalConfig>),
    TriggerRule(TriggerRuleConfig),
    Unsupported(String),
}

impl Action {
    /// Parse a resolved config for the given kind.
    pub fn parse(kind: ActionKind, config: Value) -> Result<Self, ActionError> {
        // Actions without config are authored as `config: null` or omitted.
        let config = match config {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let action = match kind {
            ActionKind::TriggerModel => Action::TriggerModel(parse_config(config, "trigger-model")?),
            ActionKind::SendNotification => {
                Action::SendNotification(parse_config(config, "send-notification")?)
            }
            ActionKind::CallWebhook => Action::CallWebhook(parse_config(config, "call-webhook")?),
            ActionKind::StoreData => Action::StoreData(parse_config(config, "store-data")?),
            ActionKind::TransformData => {
                Action::TransformData(parse_config(config, "transform-data")?)
            }
            ActionKind::Conditional => {
                Action::Conditional(Box::new(parse_config(config, "conditional-action")?))
            }
            ActionKind::TriggerRule => Action::TriggerRule(parse_config(config, "trigger-rule")?),
            ActionKind::Unsupported(name) => Action::Unsupported(name),
        };

        Ok(action)
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(
    config: Value,
    kind: &str,
) -> Result<T, ActionError> {
    serde_json::from_value(config)
        .map_err(|e| ActionError::Configuration(format!("Invalid {} config: {}", kind, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_kind_from_type() {
        assert_eq!(ActionKind::from_type("trigger-model"), ActionKind::TriggerModel);
        assert_eq!(ActionKind::from_type("conditional"), ActionKind::Conditional);
        assert_eq!(ActionKind::from_type("conditional-action"), ActionKind::Conditional);
        assert_eq!(
            ActionKind::from_type("send-fax"),
            ActionKind::Unsupported("send-fax".to_string())
        );
        assert_eq!(ActionKind::from_type("send-fax").as_str(), "send-fax");
    }

    #[test]
    fn test_action_definition_defaults() {
        let def: ActionDefinition = serde_json::from_value(json!({
            "id": "a1",
            "type": "store-data"
        }))
        .unwrap();
        assert_eq!(def.error_handling.strategy, ErrorStrategy::Stop);
        assert!(def.stops_on_failure());
        assert!(def.output_variable.is_none());
        assert_eq!(def.config, Value::Null);
    }

    #[test]
    fn test_action_definition_camel_case() {
        let def: ActionDefinition = serde_json::from_value(json!({
            "id": "a1",
            "type": "call-webhook",
            "config": {"url": "https://example.com"},
            "errorHandling": {"strategy": "continue"},
            "outputVariable": "hook"
        }))
        .unwrap();
        assert!(!def.stops_on_failure());
        assert_eq!(def.output_variable.as_deref(), Some("hook"));
        assert_eq!(def.kind(), ActionKind::CallWebhook);
    }

    #[test]
    fn test_parse_typed_config() {
        let action = Action::parse(
            ActionKind::StoreData,
            json!({"key": "total", "value": "5"}),
        )
        .unwrap();
        assert!(matches!(action, Action::StoreData(ref c) if c.key == "total"));

        let err = Action::parse(ActionKind::CallWebhook, json!({"method": "GET"})).unwrap_err();
        assert!(matches!(err, ActionError::Configuration(_)));

        let action = Action::parse(ActionKind::Unsupported("x".into()), Value::Null).unwrap();
        assert!(matches!(action, Action::Unsupported(ref n) if n == "x"));
    }
}
