//! In-memory rule store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::RuleStore;
use crate::error::CollaboratorError;
use crate::rule::Rule;

/// Rule store held in memory, keyed by rule id.
#[derive(Debug, Default)]
pub struct InMemoryRuleStore {
    rules: RwLock<HashMap<String, Rule>>,
}

impl InMemoryRuleStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rules.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        Self {
            rules: RwLock::new(rules.into_iter().map(|r| (r.id.clone(), r)).collect()),
        }
    }

    /// Insert or replace a rule.
    pub async fn insert(&self, rule: Rule) {
        self.rules.write().await.insert(rule.id.clone(), rule);
    }

    /// Remove a rule.
    pub async fn remove(&self, rule_id: &str) -> Option<Rule> {
        self.rules.write().await.remove(rule_id)
    }

    /// Number of stored rules.
    pub async fn len(&self) -> usize {
        self.rules.read().await.len()
    }

    /// Returns true if no rules are stored.
    pub async fn is_empty(&self) -> bool {
        self.rules.read().await.is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn get_rule(&self, rule_id: &str) -> Result<Option<Rule>, CollaboratorError> {
        Ok(self.rules.read().await.get(rule_id).cloned())
    }
}
