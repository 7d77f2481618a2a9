//! Engine error types.

use thiserror::Error;

/// Run-level rejections reported to the caller before any execution result exists.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rule id could not be resolved.
    #[error("Rule not found: {0}")]
    RuleNotFound(String),

    /// Rule exists but is switched off.
    #[error("Rule is inactive: {0}")]
    RuleInactive(String),

    /// Webhook token did not match the rule's configured token.
    #[error("Invalid webhook token for rule {0}")]
    InvalidWebhookToken(String),

    /// Rule is not configured for webhook triggering.
    #[error("Rule {0} does not accept webhook triggers")]
    WebhookNotEnabled(String),

    /// Payload is missing a field the rule's input schema marks as required.
    #[error("Missing required input field: {0}")]
    MissingRequiredField(String),

    /// Rule document is structurally invalid.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Rule store lookup failed.
    #[error("Rule store error: {0}")]
    Store(String),
}

/// Errors raised while executing a single action.
///
/// These never escape the dispatcher; they are folded into a failed
/// [`ActionResult`](crate::result::ActionResult).
#[derive(Debug, Error)]
pub enum ActionError {
    /// Action configuration could not be interpreted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A required configuration key is absent.
    #[error("Missing required config field: {0}")]
    MissingField(&'static str),

    /// External collaborator reported a failure.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Nested rule could not be started.
    #[error("Chained rule rejected: {0}")]
    Chain(#[from] ChainError),

    /// Action did not finish before the run deadline.
    #[error("Action timed out after {0} ms")]
    Timeout(u64),

    /// Any other execution failure.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<serde_json::Error> for ActionError {
    fn from(e: serde_json::Error) -> Self {
        ActionError::Configuration(e.to_string())
    }
}

/// Structured rejection of a `trigger-rule` chain.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Target rule is already running further up the chain.
    #[error("cycle detected: rule {rule_id} already in chain [{chain}]")]
    Cycle { rule_id: String, chain: String },

    /// Chain would exceed the configured maximum depth.
    #[error("maximum chain depth {max_depth} reached at rule {rule_id}")]
    DepthExceeded { rule_id: String, max_depth: usize },
}

/// Errors from a single leaf condition. Absorbed into `false` by the evaluator.
#[derive(Debug, Error)]
pub enum ConditionError {
    /// Field path did not resolve.
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// Operands cannot be compared.
    #[error("cannot compare {left} with {right}")]
    TypeMismatch { left: String, right: String },

    /// Regex pattern failed to compile.
    #[error("invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Failures reported by external collaborators.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The collaborator is not wired into this engine.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Collaborator-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        CollaboratorError::Http(e.to_string())
    }
}

/// Result type alias for run-level operations.
pub type EngineResult<T> = Result<T, EngineError>;
