//! Condition tree evaluation.
//!
//! A rule fires when its condition tree evaluates to `true`. Leaf errors
//! (unresolved fields, incomparable operands, bad regex) never abort a run:
//! the leaf becomes `false` and the error is kept as a diagnostic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::ConditionError;
use crate::value::{as_number, is_truthy, loosely_equal, value_to_string};

/// Boolean combinator of a group node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GroupOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// Node of a condition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConditionNode {
    /// AND/OR over child nodes. An empty group is `true`.
    Group {
        #[serde(default)]
        operator: GroupOperator,
        #[serde(default)]
        children: Vec<ConditionNode>,
    },
    /// Comparison of a context field against a literal.
    Condition {
        field: String,
        /// Operator name; unknown names behave as `equals`.
        #[serde(default)]
        operator: String,
        #[serde(default)]
        value: Value,
    },
}

impl Default for ConditionNode {
    fn default() -> Self {
        ConditionNode::Group {
            operator: GroupOperator::And,
            children: Vec::new(),
        }
    }
}

impl ConditionNode {
    /// Build a leaf condition.
    pub fn leaf(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        ConditionNode::Condition {
            field: field.into(),
            operator: operator.as_str().to_string(),
            value,
        }
    }

    /// Build an AND group.
    pub fn all(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Group {
            operator: GroupOperator::And,
            children,
        }
    }

    /// Build an OR group.
    pub fn any(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Group {
            operator: GroupOperator::Or,
            children,
        }
    }
}

/// Leaf comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Contains,
    StartsWith,
    EndsWith,
    InList,
    NotInList,
    IsEmpty,
    IsNotEmpty,
    Regex,
}

impl ConditionOperator {
    /// Parse an operator name. Unknown names fall back to `Equals`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "equals" => ConditionOperator::Equals,
            "not_equals" => ConditionOperator::NotEquals,
            "greater_than" => ConditionOperator::GreaterThan,
            "less_than" => ConditionOperator::LessThan,
            "greater_equal" => ConditionOperator::GreaterEqual,
            "less_equal" => ConditionOperator::LessEqual,
            "contains" => ConditionOperator::Contains,
            "starts_with" => ConditionOperator::StartsWith,
            "ends_with" => ConditionOperator::EndsWith,
            "in_list" => ConditionOperator::InList,
            "not_in_list" => ConditionOperator::NotInList,
            "is_empty" => ConditionOperator::IsEmpty,
            "is_not_empty" => ConditionOperator::IsNotEmpty,
            "regex" => ConditionOperator::Regex,
            other => {
                tracing::debug!(operator = %other, "Unknown condition operator, using equals");
                ConditionOperator::Equals
            }
        }
    }

    /// Canonical operator name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::Equals => "equals",
            ConditionOperator::NotEquals => "not_equals",
            ConditionOperator::GreaterThan => "greater_than",
            ConditionOperator::LessThan => "less_than",
            ConditionOperator::GreaterEqual => "greater_equal",
            ConditionOperator::LessEqual => "less_equal",
            ConditionOperator::Contains => "contains",
            ConditionOperator::StartsWith => "starts_with",
            ConditionOperator::EndsWith => "ends_with",
            ConditionOperator::InList => "in_list",
            ConditionOperator::NotInList => "not_in_list",
            ConditionOperator::IsEmpty => "is_empty",
            ConditionOperator::IsNotEmpty => "is_not_empty",
            ConditionOperator::Regex => "regex",
        }
    }
}

/// Absorbed leaf error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionDiagnostic {
    pub field: String,
    pub operator: String,
    pub message: String,
}

impl std::fmt::Display for ConditionDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.field, self.operator, self.message)
    }
}

/// Outcome of evaluating a whole tree.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    pub matched: bool,
    pub diagnostics: Vec<ConditionDiagnostic>,
}

/// Evaluates condition trees against an execution context.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a tree, discarding diagnostics.
    pub fn evaluate(&self, node: &ConditionNode, ctx: &ExecutionContext) -> bool {
        self.evaluate_with_diagnostics(node, ctx).matched
    }

    /// Evaluate a tree and collect absorbed leaf errors.
    pub fn evaluate_with_diagnostics(
        &self,
        node: &ConditionNode,
        ctx: &ExecutionContext,
    ) -> Evaluation {
        let mut diagnostics = Vec::new();
        let matched = self.evaluate_node(node, ctx, &mut diagnostics);
        Evaluation {
            matched,
            diagnostics,
        }
    }

    fn evaluate_node(
        &self,
        node: &ConditionNode,
        ctx: &ExecutionContext,
        diagnostics: &mut Vec<ConditionDiagnostic>,
    ) -> bool {
        match node {
            ConditionNode::Group { children, .. } if children.is_empty() => true,
            ConditionNode::Group {
                operator: GroupOperator::And,
                children,
            } => children
                .iter()
                .all(|child| self.evaluate_node(child, ctx, diagnostics)),
            ConditionNode::Group {
                operator: GroupOperator::Or,
                children,
            } => children
                .iter()
                .any(|child| self.evaluate_node(child, ctx, diagnostics)),
            ConditionNode::Condition {
                field,
                operator,
                value,
            } => {
                let op = ConditionOperator::from_name(operator);
                match evaluate_leaf(field, op, value, ctx) {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::debug!(
                            field = %field,
                            operator = %operator,
                            error = %e,
                            "Condition evaluated to false"
                        );
                        diagnostics.push(ConditionDiagnostic {
                            field: field.clone(),
                            operator: operator.clone(),
                            message: e.to_string(),
                        });
                        false
                    }
                }
            }
        }
    }
}

/// Evaluate a single leaf condition.
fn evaluate_leaf(
    field: &str,
    op: ConditionOperator,
    expected: &Value,
    ctx: &ExecutionContext,
) -> Result<bool, ConditionError> {
    let actual = match ctx.resolve(field) {
        Some(value) => value,
        // Missing counts as empty; every other operator needs a value.
        None => match op {
            ConditionOperator::IsEmpty => return Ok(true),
            ConditionOperator::IsNotEmpty => return Ok(false),
            _ => return Err(ConditionError::FieldNotFound(field.to_string())),
        },
    };

    match op {
        ConditionOperator::Equals => Ok(loosely_equal(actual, expected)),
        ConditionOperator::NotEquals => Ok(!loosely_equal(actual, expected)),
        ConditionOperator::GreaterThan => compare(actual, expected).map(Ordering::is_gt),
        ConditionOperator::LessThan => compare(actual, expected).map(Ordering::is_lt),
        ConditionOperator::GreaterEqual => compare(actual, expected).map(Ordering::is_ge),
        ConditionOperator::LessEqual => compare(actual, expected).map(Ordering::is_le),
        ConditionOperator::Contains => {
            Ok(value_to_string(actual).contains(&value_to_string(expected)))
        }
        ConditionOperator::StartsWith => {
            Ok(value_to_string(actual).starts_with(&value_to_string(expected)))
        }
        ConditionOperator::EndsWith => {
            Ok(value_to_string(actual).ends_with(&value_to_string(expected)))
        }
        ConditionOperator::InList => Ok(in_list(actual, expected)),
        ConditionOperator::NotInList => Ok(!in_list(actual, expected)),
        ConditionOperator::IsEmpty => Ok(!is_truthy(actual)),
        ConditionOperator::IsNotEmpty => Ok(is_truthy(actual)),
        ConditionOperator::Regex => {
            let re = regex::Regex::new(&value_to_string(expected))?;
            Ok(re.is_match(&value_to_string(actual)))
        }
    }
}

/// Order two values numerically when both coerce to numbers, otherwise
/// lexically when both are strings.
fn compare(left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    if let (Some(a), Some(b)) = (as_number(left), as_number(right)) {
        return a.partial_cmp(&b).ok_or_else(|| mismatch(left, right));
    }

    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(mismatch(left, right)),
    }
}

fn mismatch(left: &Value, right: &Value) -> ConditionError {
    ConditionError::TypeMismatch {
        left: left.to_string(),
        right: right.to_string(),
    }
}

/// Membership test. A string list is split on commas first.
fn in_list(actual: &Value, list: &Value) -> bool {
    match list {
        Value::String(s) => {
            let needle = value_to_string(actual);
            s.split(',').any(|item| item.trim() == needle)
        }
        Value::Array(items) => items.iter().any(|item| loosely_equal(actual, item)),
        other => loosely_equal(actual, other),
    }
}
