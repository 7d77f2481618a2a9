//! `{{path}}` placeholder substitution.
//!
//! Placeholders are resolved against an [`ExecutionContext`] and replaced by
//! the string form of the resolved value. A placeholder whose path does not
//! resolve is left in the output exactly as written, braces included.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::value::value_to_string;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("placeholder pattern is valid"));

/// Resolves template placeholders in strings and nested config values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    /// Create a new template resolver.
    pub fn new() -> Self {
        Self
    }

    /// Check if a string contains a placeholder.
    pub fn is_template(s: &str) -> bool {
        PLACEHOLDER.is_match(s)
    }

    /// Substitute every resolvable placeholder in `template`.
    pub fn resolve_string(&self, template: &str, ctx: &ExecutionContext) -> String {
        if !template.contains("{{") {
            return template.to_string();
        }

        PLACEHOLDER
            .replace_all(template, |caps: &Captures| match ctx.resolve(&caps[1]) {
                Some(value) => value_to_string(value),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Resolve placeholders in every string nested inside `value`.
    ///
    /// Objects and arrays are walked recursively; numbers, booleans and
    /// nulls are returned unchanged.
    pub fn resolve_mapping(&self, value: &Value, ctx: &ExecutionContext) -> Value {
        match value {
            Value::String(s) => Value::String(self.resolve_string(s, ctx)),
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_mapping(v, ctx)))
                    .collect(),
            ),
            Value::Array(arr) => {
                Value::Array(arr.iter().map(|v| self.resolve_mapping(v, ctx)).collect())
            }
            _ => value.clone(),
        }
    }
}
