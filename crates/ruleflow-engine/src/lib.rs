//! Ruleflow Engine
//!
//! Executes user-authored automation rules against a trigger input.
//!
//! This crate provides:
//! - Condition evaluation over nested AND/OR trees
//! - `{{path}}` template resolution against the run context
//! - Builtin actions: trigger-model, send-notification, call-webhook,
//!   store-data, transform-data, conditional-action, trigger-rule
//! - Sequential and parallel action execution with chain guards,
//!   run deadlines and token cost accounting
//! - Webhook token and input validation

pub mod actions;
pub mod collaborators;
pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod rule;
pub mod template;
pub mod trigger;
pub mod value;

#[cfg(test)]
mod testing;

pub use actions::{ActionDefinition, ActionKind, ErrorStrategy};
pub use collaborators::{
    HttpWebhookCaller, InMemoryRuleStore, ModelExecutor, NotificationSender, RuleStore,
    WebhookCaller,
};
pub use condition::{ConditionEvaluator, ConditionNode, ConditionOperator};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use error::{ActionError, EngineError, EngineResult};
pub use orchestrator::{RuleEngine, RuleEngineBuilder, RunScope};
pub use result::{ActionResult, ActionStatus, ExecutionResult, RunStatus};
pub use rule::{ExecutionMode, Rule, RuleLogic, TriggerKind};
pub use template::TemplateResolver;
