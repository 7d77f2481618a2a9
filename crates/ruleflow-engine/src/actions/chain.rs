//! `trigger-rule` action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatcher::{ActionDispatcher, Outcome};
use crate::context::ExecutionContext;
use crate::error::ActionError;

/// Config of a `trigger-rule` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRuleConfig {
    #[serde(alias = "targetRuleId", alias = "rule_id")]
    pub rule_id: String,

    /// Input of the chained run; the current trigger input is used when absent.
    #[serde(default, alias = "input", alias = "input_mapping")]
    pub input_mapping: Option<Value>,
}

/// Start an independent chained run of the target rule and embed its
/// result as this action's output.
pub(super) async fn run(
    dispatcher: &ActionDispatcher<'_>,
    config: TriggerRuleConfig,
    ctx: &ExecutionContext,
) -> Result<Outcome, ActionError> {
    if config.rule_id.trim().is_empty() {
        return Err(ActionError::MissingField("ruleId"));
    }

    let engine = dispatcher.engine();
    let scope = dispatcher.scope();

    scope.check_chain(&config.rule_id, engine.config().max_chain_depth)?;

    let rule = engine
        .rule_store()
        .get_rule(&config.rule_id)
        .await?
        .ok_or_else(|| ActionError::ExecutionFailed(format!("Rule not found: {}", config.rule_id)))?;

    if !rule.is_active {
        return Err(ActionError::ExecutionFailed(format!(
            "Rule is inactive: {}",
            rule.id
        )));
    }

    let input = config.input_mapping.unwrap_or_else(|| ctx.input().clone());
    let child_scope = scope.child(&rule, engine.config().run_timeout);

    tracing::info!(
        parent_rule_id = %scope.rule_id(),
        rule_id = %rule.id,
        depth = child_scope.depth(),
        "Triggering chained rule"
    );

    let nested = engine.run_chained(&rule, input, child_scope.clone()).await;
    let error = nested.error_message.clone();
    let completed = nested.is_completed();
    let output = serde_json::to_value(&nested)?;

    // A child that ran out its budget fails the parent even if it completed.
    if child_scope.is_expired() {
        let err = ActionError::Timeout(child_scope.budget_ms());
        return Ok(Outcome::failed(output, err.to_string()));
    }

    if completed {
        Ok(Outcome::success(output))
    } else {
        Ok(Outcome::failed(
            output,
            error.unwrap_or_else(|| format!("Chained rule {} failed", rule.id)),
        ))
    }
}
