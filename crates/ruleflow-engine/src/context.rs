//! Execution context for a single rule run.
//!
//! The context has two scopes:
//! - `context`: fixed for the run (trigger input, trigger kind, rule, user, timestamp)
//! - `variables`: empty at start, written by actions as the run progresses
//!
//! Dotted paths such as `input.amount` or `total.value` are resolved by
//! looking up the first segment in `context`, then in `variables`, and
//! navigating the remaining segments into objects and arrays.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rule::{Rule, TriggerKind};

/// Scope name that addresses the whole immutable scope.
pub const CONTEXT_SCOPE: &str = "context";

/// Scope name that addresses the whole variable scope.
pub const VARIABLES_SCOPE: &str = "variables";

/// Two-scope runtime context visible to conditions, templates and actions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionContext {
    context: Map<String, Value>,

    #[serde(default)]
    variables: Map<String, Value>,
}

impl ExecutionContext {
    /// Build the context for a run of `rule` with the given trigger input.
    pub fn for_run(
        rule: &Rule,
        input: Value,
        trigger: TriggerKind,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut context = Map::new();
        context.insert("input".to_string(), input);
        context.insert("trigger".to_string(), Value::String(trigger.to_string()));
        context.insert(
            "rule".to_string(),
            serde_json::json!({ "id": rule.id, "name": rule.name }),
        );
        context.insert("user".to_string(), serde_json::json!({ "id": rule.user_id }));
        context.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_rfc3339()),
        );

        Self {
            context,
            variables: Map::new(),
        }
    }

    /// Build a context from an explicit immutable scope.
    pub fn from_scope(context: Map<String, Value>) -> Self {
        Self {
            context,
            variables: Map::new(),
        }
    }

    /// Immutable scope.
    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    /// Mutable variable scope.
    pub fn variables(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Trigger input payload.
    pub fn input(&self) -> &Value {
        self.context.get("input").unwrap_or(&Value::Null)
    }

    /// Set a variable value.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Get a variable value.
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Resolve a dotted path.
    ///
    /// Returns `None` when any segment misses; resolution never fails.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }

        let mut segments = path.split('.');
        let head = segments.next()?;

        let root = match self.context.get(head).or_else(|| self.variables.get(head)) {
            Some(value) => value,
            None => {
                // Explicit scope prefix: `variables.total`, `context.input.amount`.
                let scope = match head {
                    VARIABLES_SCOPE => &self.variables,
                    CONTEXT_SCOPE => &self.context,
                    _ => return None,
                };
                let key = segments.next()?;
                scope.get(key)?
            }
        };

        segments.try_fold(root, navigate)
    }
}

/// Step one segment into a value.
fn navigate<'a>(current: &'a Value, segment: &str) -> Option<&'a Value> {
    match current {
        Value::Object(obj) => obj.get(segment),
        Value::Array(arr) => {
            let idx: usize = segment.parse().ok()?;
            arr.get(idx)
        }
        _ => None,
    }
}
