//! Action dispatch.

use futures::future::BoxFuture;
use serde_json::Value;

use super::{chain, conditional, data, model, notify, webhook};
use super::{Action, ActionDefinition, ActionKind};
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::orchestrator::{RuleEngine, RunScope};
use crate::result::{ActionResult, ActionStatus};

/// What an action handler produced.
#[derive(Debug, Clone)]
pub(crate) struct Outcome {
    pub status: ActionStatus,
    pub output: Value,
    pub error: Option<String>,
}

impl Outcome {
    pub fn success(output: Value) -> Self {
        Self {
            status: ActionStatus::Success,
            output,
            error: None,
        }
    }

    pub fn failed(output: Value, error: impl Into<String>) -> Self {
        Self {
            status: ActionStatus::Failed,
            output,
            error: Some(error.into()),
        }
    }
}

/// Executes action definitions within one run.
///
/// Config strings are template-resolved against the context before the
/// typed config is parsed, so every handler sees concrete values.
pub struct ActionDispatcher<'a> {
    engine: &'a RuleEngine,
    scope: &'a RunScope,
}

impl<'a> ActionDispatcher<'a> {
    /// Create a dispatcher for the given run.
    pub fn new(engine: &'a RuleEngine, scope: &'a RunScope) -> Self {
        Self { engine, scope }
    }

    pub(crate) fn engine(&self) -> &'a RuleEngine {
        self.engine
    }

    pub(crate) fn scope(&self) -> &'a RunScope {
        self.scope
    }

    /// Execute an action bounded by the run deadline.
    ///
    /// A timeout yields a failed result; the action's future is dropped.
    pub async fn dispatch(
        &self,
        definition: &ActionDefinition,
        ctx: &mut ExecutionContext,
    ) -> ActionResult {
        match tokio::time::timeout_at(self.scope.deadline(), self.execute(definition, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                let err = ActionError::Timeout(self.scope.budget_ms());
                tracing::warn!(
                    rule_id = %self.scope.rule_id(),
                    action_id = %definition.id,
                    error = %err,
                    "Action exceeded run deadline"
                );
                ActionResult::failed(&definition.id, &definition.action_type, err.to_string())
            }
        }
    }

    /// Execute an action without a deadline of its own.
    ///
    /// Branch actions of a conditional are resolved when they are executed,
    /// not together with their parent. On success, the output is written to the action's `outputVariable`.
    pub fn execute<'s>(
        &'s self,
        definition: &'s ActionDefinition,
        ctx: &'s mut ExecutionContext,
    ) -> BoxFuture<'s, ActionResult> {
        Box::pin(async move {
            tracing::debug!(
                rule_id = %self.scope.rule_id(),
                action_id = %definition.id,
                action_type = %definition.action_type,
                "Executing action"
            );

            let kind = definition.kind();
            let config = match kind {
                ActionKind::Conditional => {
                    conditional::resolve_config(self.engine.templates(), &definition.config, ctx)
                }
                _ => self.engine.templates().resolve_mapping(&definition.config, ctx),
            };

            let outcome = match Action::parse(kind, config) {
                Ok(action) => self.run_action(action, ctx).await,
                Err(e) => Err(e),
            };

            let result = match outcome {
                Ok(outcome) => ActionResult {
                    action_id: definition.id.clone(),
                    action_type: definition.action_type.clone(),
                    status: outcome.status,
                    output: outcome.output,
                    error: outcome.error,
                },
                Err(e) => ActionResult::failed(&definition.id, &definition.action_type, e.to_string()),
            };

            match result.status {
                ActionStatus::Success => {
                    if let Some(ref name) = definition.output_variable {
                        ctx.set_variable(name.clone(), result.output.clone());
                    }
                }
                ActionStatus::Failed => tracing::warn!(
                    rule_id = %self.scope.rule_id(),
                    action_id = %definition.id,
                    action_type = %definition.action_type,
                    error = result.error.as_deref().unwrap_or(""),
                    "Action failed"
                ),
                ActionStatus::Unsupported => tracing::info!(
                    rule_id = %self.scope.rule_id(),
                    action_id = %definition.id,
                    action_type = %definition.action_type,
                    "Unsupported action type skipped"
                ),
            }

            result
        })
    }

    async fn run_action(
        &self,
        action: Action,
        ctx: &mut ExecutionContext,
    ) -> Result<Outcome, ActionError> {
        match action {
            Action::TriggerModel(config) => model::run(self, config, ctx).await,
            Action::SendNotification(config) => notify::run(self, config).await,
            Action::CallWebhook(request) => webhook::run(self, request).await,
            Action::StoreData(config) => data::store(config, ctx),
            Action::TransformData(config) => data::transform(config, ctx),
            Action::Conditional(config) => conditional::run(self, *config, ctx).await,
            Action::TriggerRule(config) => chain::run(self, config, ctx).await,
            Action::Unsupported(name) => Ok(Outcome {
                status: ActionStatus::Unsupported,
                output: Value::Null,
                error: Some(format!("Unsupported action type: {}", name)),
            }),
        }
    }
}
