//! Webhook trigger gate.
//!
//! Checks a webhook call before the engine runs: the presented token must
//! equal the rule's configured token, and every required input field must be
//! present in the payload.

use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::error::{EngineError, EngineResult};
use crate::rule::{Rule, TriggerKind};

/// Validate a webhook call against the rule's trigger configuration.
pub fn authorize_webhook(rule: &Rule, token: &str, payload: &Value) -> EngineResult<()> {
    let config = &rule.trigger_config;

    if config.trigger_type != TriggerKind::Webhook {
        return Err(EngineError::WebhookNotEnabled(rule.id.clone()));
    }

    let expected = config
        .webhook_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| EngineError::WebhookNotEnabled(rule.id.clone()))?;

    if !tokens_match(expected, token) {
        tracing::warn!(rule_id = %rule.id, "Rejected webhook call with invalid token");
        return Err(EngineError::InvalidWebhookToken(rule.id.clone()));
    }

    if let Some(ref schema) = config.input_schema {
        for field in schema.required_fields() {
            if !has_field(payload, field) {
                return Err(EngineError::MissingRequiredField(field.to_string()));
            }
        }
    }

    Ok(())
}

/// Exact comparison in constant time for equal-length tokens.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let (expected, presented) = (expected.as_bytes(), presented.as_bytes());
    if expected.len() != presented.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    expected.ct_eq(presented).into()
}

/// A field is present when its dotted path resolves to a non-null value.
fn has_field(payload: &Value, path: &str) -> bool {
    let mut current = payload;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(next) => current = next,
            None => return false,
        }
    }
    !current.is_null()
}
