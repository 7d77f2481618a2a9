//! Action and run result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::rule::TriggerKind;

/// Status of a single action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
    /// Declared type has no builtin behavior. Non-fatal.
    Unsupported,
}

impl ActionStatus {
    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionStatus::Success)
    }

    /// Returns true if the status indicates a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, ActionStatus::Failed)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionStatus::Success => write!(f, "success"),
            ActionStatus::Failed => write!(f, "failed"),
            ActionStatus::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Result of one executed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub action_id: String,

    /// Declared type string, as authored.
    pub action_type: String,

    pub status: ActionStatus,

    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    /// Create a successful result with output.
    pub fn success(
        action_id: impl Into<String>,
        action_type: impl Into<String>,
        output: Value,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            action_type: action_type.into(),
            status: ActionStatus::Success,
            output,
            error: None,
        }
    }

    /// Create a failed result with message.
    pub fn failed(
        action_id: impl Into<String>,
        action_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            action_id: action_id.into(),
            action_type: action_type.into(),
            status: ActionStatus::Failed,
            output: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Create a result for an action type without builtin behavior.
    pub fn unsupported(action_id: impl Into<String>, action_type: impl Into<String>) -> Self {
        let action_type = action_type.into();
        Self {
            action_id: action_id.into(),
            error: Some(format!("Unsupported action type: {}", action_type)),
            action_type,
            status: ActionStatus::Unsupported,
            output: Value::Null,
        }
    }

    /// Attach output, keeping status.
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    /// Returns true if the action succeeded.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the action failed.
    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one rule run, handed back to the caller for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: Uuid,

    pub rule_id: String,

    pub trigger_type: TriggerKind,

    pub started_at: DateTime<Utc>,

    pub conditions_met: bool,

    /// Per-action results in declaration order.
    #[serde(default)]
    pub action_results: Vec<ActionResult>,

    pub status: RunStatus,

    pub execution_time_ms: u64,

    pub token_cost: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Condition leaf errors that were absorbed as `false`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl ExecutionResult {
    /// Returns true if the run completed.
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Find the result of an action by id.
    pub fn action(&self, action_id: &str) -> Option<&ActionResult> {
        self.action_results.iter().find(|r| r.action_id == action_id)
    }
}
