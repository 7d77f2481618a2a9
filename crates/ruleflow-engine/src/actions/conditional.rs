//! `conditional-action` action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatcher::{ActionDispatcher, Outcome};
use super::ActionDefinition;
use crate::condition::ConditionNode;
use crate::context::ExecutionContext;
use crate::error::ActionError;
use crate::result::ActionStatus;
use crate::template::TemplateResolver;

/// Config keys holding branch actions, left unresolved until dispatched.
const BRANCH_KEYS: [&str; 4] = ["thenAction", "then", "elseAction", "else"];

/// Config of a `conditional-action`: an embedded condition tree and the
/// action to dispatch for each branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalConfig {
    #[serde(alias = "conditions")]
    pub condition: ConditionNode,

    #[serde(default, alias = "then", skip_serializing_if = "Option::is_none")]
    pub then_action: Option<ActionDefinition>,

    #[serde(default, alias = "else", skip_serializing_if = "Option::is_none")]
    pub else_action: Option<ActionDefinition>,
}

/// Resolve templates in a conditional config except inside its branch
/// actions, which the dispatcher resolves once when one is selected.
pub(super) fn resolve_config(
    templates: &TemplateResolver,
    config: &Value,
    ctx: &ExecutionContext,
) -> Value {
    let Value::Object(map) = config else {
        return templates.resolve_mapping(config, ctx);
    };

    Value::Object(
        map.iter()
            .map(|(key, value)| {
                let value = if BRANCH_KEYS.contains(&key.as_str()) {
                    value.clone()
                } else {
                    templates.resolve_mapping(value, ctx)
                };
                (key.clone(), value)
            })
            .collect(),
    )
}

/// Evaluate the condition and dispatch the selected branch in the same run.
pub(super) async fn run(
    dispatcher: &ActionDispatcher<'_>,
    config: ConditionalConfig,
    ctx: &mut ExecutionContext,
) -> Result<Outcome, ActionError> {
    let evaluation = dispatcher
        .engine()
        .evaluator()
        .evaluate_with_diagnostics(&config.condition, ctx);

    let (branch, selected) = if evaluation.matched {
        ("then", config.then_action)
    } else {
        ("else", config.else_action)
    };

    let Some(action) = selected else {
        return Ok(Outcome::success(serde_json::json!({
            "conditionMet": evaluation.matched,
            "branch": branch,
            "result": Value::Null,
        })));
    };

    let result = dispatcher.execute(&action, ctx).await;

    let output = serde_json::json!({
        "conditionMet": evaluation.matched,
        "branch": branch,
        "result": result,
    });

    Ok(match result.status {
        ActionStatus::Failed => Outcome::failed(
            output,
            result
                .error
                .unwrap_or_else(|| format!("{} branch action failed", branch)),
        ),
        ActionStatus::Success | ActionStatus::Unsupported => Outcome::success(output),
    })
}
