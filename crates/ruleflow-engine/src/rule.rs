//! Rule definitions.
//!
//! A [`Rule`] is owned and persisted outside the engine. The engine only
//! reads it: the condition tree decides whether the rule fires and the
//! ordered action list decides what happens when it does.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::actions::ActionDefinition;
use crate::condition::ConditionNode;
use crate::error::{EngineError, EngineResult};

/// How the action list of a rule is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Declared order, stop-on-failure unless the action says `continue`.
    #[default]
    Sequential,
    /// Concurrent fan-out, joined before the run returns.
    Parallel,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    #[default]
    Manual,
    Webhook,
    /// Started by a `trigger-rule` action of another rule.
    Chained,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Manual => write!(f, "manual"),
            TriggerKind::Webhook => write!(f, "webhook"),
            TriggerKind::Chained => write!(f, "chained"),
        }
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TriggerKind::Manual),
            "webhook" => Ok(TriggerKind::Webhook),
            "chained" => Ok(TriggerKind::Chained),
            other => Err(format!("unknown trigger kind: {}", other)),
        }
    }
}

/// One declared input field of a webhook-triggered rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,

    /// Informational type label ("string", "number", ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,

    #[serde(default)]
    pub required: bool,
}

/// Declared shape of the trigger payload.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InputSchema {
    #[serde(default)]
    pub fields: Vec<InputField>,
}

impl InputSchema {
    /// Names of fields that must be present in the payload.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

/// Trigger configuration of a rule.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default, rename = "type")]
    pub trigger_type: TriggerKind,

    /// Secret the webhook caller must present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<InputSchema>,
}

/// Condition tree plus ordered actions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleLogic {
    #[serde(default)]
    pub conditions: ConditionNode,

    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
}

fn default_active() -> bool {
    true
}

/// A user-authored rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: String,

    /// Owning user.
    #[serde(default)]
    pub user_id: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub logic: RuleLogic,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    #[serde(default)]
    pub trigger_config: TriggerConfig,

    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Fixed part of the token cost. Falls back to the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_cost: Option<u64>,

    /// Rule this one was cloned from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rule_id: Option<String>,

    /// Derived artifact this rule is also published as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_model_id: Option<String>,
}

impl Rule {
    /// Create an active, sequential, manually triggered rule.
    pub fn new(id: impl Into<String>, name: impl Into<String>, logic: RuleLogic) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            name: name.into(),
            description: None,
            logic,
            execution_mode: ExecutionMode::Sequential,
            trigger_config: TriggerConfig::default(),
            is_active: true,
            base_cost: None,
            parent_rule_id: None,
            generated_model_id: None,
        }
    }

    /// Set the execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Set the base cost.
    pub fn with_base_cost(mut self, cost: u64) -> Self {
        self.base_cost = Some(cost);
        self
    }

    /// Set the owning user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Copy this rule under a new id, keeping lineage to the original.
    pub fn clone_as(&self, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_rule_id: Some(self.id.clone()),
            generated_model_id: None,
            trigger_config: TriggerConfig {
                webhook_token: None,
                ..self.trigger_config.clone()
            },
            ..self.clone()
        }
    }

    /// Reject rule documents a loader should never hand to the engine.
    pub fn validate(&self) -> EngineResult<()> {
        if self.id.trim().is_empty() {
            return Err(EngineError::InvalidRule("rule id is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for action in &self.logic.actions {
            if action.id.trim().is_empty() {
                return Err(EngineError::InvalidRule(format!(
                    "action of type '{}' has an empty id",
                    action.action_type
                )));
            }
            if !seen.insert(action.id.as_str()) {
                return Err(EngineError::InvalidRule(format!(
                    "duplicate action id '{}'",
                    action.id
                )));
            }
        }

        if self.trigger_config.trigger_type == TriggerKind::Webhook
            && self
                .trigger_config
                .webhook_token
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err(EngineError::InvalidRule(
                "webhook rules require a webhookToken".to_string(),
            ));
        }

        Ok(())
    }
}
