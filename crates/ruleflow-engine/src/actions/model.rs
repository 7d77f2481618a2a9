//! `trigger-model` action.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dispatcher::{ActionDispatcher, Outcome};
use crate::collaborators::ModelRequest;
use crate::context::ExecutionContext;
use crate::error::ActionError;

/// Config of a `trigger-model` action.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerModelConfig {
    /// Target model reference.
    #[serde(default, alias = "model", alias = "modelReference", alias = "model_id")]
    pub model_id: Option<String>,

    /// Model input; the trigger input is used when absent.
    #[serde(default, alias = "input", alias = "input_mapping")]
    pub input_mapping: Option<Value>,
}

pub(super) async fn run(
    dispatcher: &ActionDispatcher<'_>,
    config: TriggerModelConfig,
    ctx: &ExecutionContext,
) -> Result<Outcome, ActionError> {
    let model_id = config
        .model_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(ActionError::MissingField("modelId"))?;

    let input = config.input_mapping.unwrap_or_else(|| ctx.input().clone());
    let scope = dispatcher.scope();

    tracing::debug!(model_id = %model_id, rule_id = %scope.rule_id(), "Triggering model");

    let output = dispatcher
        .engine()
        .model_executor()
        .execute(ModelRequest {
            model_id: model_id.clone(),
            input,
            rule_id: scope.rule_id().to_string(),
            user_id: scope.user_id().to_string(),
        })
        .await?;

    Ok(Outcome::success(serde_json::json!({
        "modelId": model_id,
        "output": output,
    })))
}
