//! Rule run orchestration.
//!
//! Owns the lifecycle of one run:
//! - Builds the execution context
//! - Evaluates the condition tree
//! - Executes actions sequentially or as a joined fan-out
//! - Aggregates results, measures time and computes token cost
//!
//! Nothing that goes wrong inside a run escapes it. Preconditions (unknown
//! or inactive rule, rejected webhook) are returned as [`EngineError`]; every
//! other failure, panics included, becomes an [`ExecutionResult`] with
//! status `failed`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use crate::actions::{ActionDefinition, ActionDispatcher};
use crate::collaborators::{
    HttpWebhookCaller, InMemoryRuleStore, LogNotificationSender, ModelExecutor,
    NotificationSender, RuleStore, UnconfiguredModelExecutor, WebhookCaller,
};
use crate::condition::ConditionEvaluator;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::{ChainError, EngineError, EngineResult};
use crate::result::{ActionResult, ExecutionResult, RunStatus};
use crate::rule::{ExecutionMode, Rule, TriggerKind};
use crate::template::TemplateResolver;
use crate::trigger::authorize_webhook;
use crate::value::serialized_size;

/// Bytes of serialized input plus output per unit of token cost.
const BYTES_PER_COST_UNIT: usize = 100;

/// Call-chain bookkeeping and deadline of one run.
#[derive(Debug, Clone)]
pub struct RunScope {
    rule_id: String,
    user_id: String,
    /// Rule ids in flight, outermost first, including this run's rule.
    chain: Vec<String>,
    depth: usize,
    deadline: Instant,
    budget: Duration,
}

impl RunScope {
    /// Scope of a top-level run.
    pub fn root(rule: &Rule, timeout: Duration) -> Self {
        Self {
            rule_id: rule.id.clone(),
            user_id: rule.user_id.clone(),
            chain: vec![rule.id.clone()],
            depth: 0,
            deadline: Instant::now() + timeout,
            budget: timeout,
        }
    }

    /// Scope of a chained run started from this one.
    ///
    /// The child never outlives the parent's deadline.
    pub fn child(&self, rule: &Rule, timeout: Duration) -> Self {
        let now = Instant::now();
        let deadline = std::cmp::min(self.deadline, now + timeout);
        let mut chain = self.chain.clone();
        chain.push(rule.id.clone());

        Self {
            rule_id: rule.id.clone(),
            user_id: rule.user_id.clone(),
            chain,
            depth: self.depth + 1,
            deadline,
            budget: deadline.saturating_duration_since(now),
        }
    }

    /// Reject a chained run that would cycle or exceed `max_depth`.
    pub fn check_chain(&self, rule_id: &str, max_depth: usize) -> Result<(), ChainError> {
        if self.chain.iter().any(|id| id == rule_id) {
            return Err(ChainError::Cycle {
                rule_id: rule_id.to_string(),
                chain: self.chain.join(" -> "),
            });
        }

        if self.depth + 1 > max_depth {
            return Err(ChainError::DepthExceeded {
                rule_id: rule_id.to_string(),
                max_depth,
            });
        }

        Ok(())
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    /// Nesting depth; 0 for a top-level run.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time budget the run started with, in milliseconds.
    pub fn budget_ms(&self) -> u64 {
        self.budget.as_millis() as u64
    }

    /// Returns true once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

struct EngineInner {
    config: EngineConfig,
    evaluator: ConditionEvaluator,
    templates: TemplateResolver,
    models: Arc<dyn ModelExecutor>,
    notifier: Arc<dyn NotificationSender>,
    webhooks: Arc<dyn WebhookCaller>,
    rules: Arc<dyn RuleStore>,
}

/// Rule execution engine. Cheap to clone; clones share collaborators.
#[derive(Clone)]
pub struct RuleEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder wiring collaborators into a [`RuleEngine`].
pub struct RuleEngineBuilder {
    config: EngineConfig,
    models: Option<Arc<dyn ModelExecutor>>,
    notifier: Option<Arc<dyn NotificationSender>>,
    webhooks: Option<Arc<dyn WebhookCaller>>,
    rules: Option<Arc<dyn RuleStore>>,
}

impl RuleEngineBuilder {
    /// Use the given model executor.
    pub fn model_executor<T: ModelExecutor + 'static>(mut self, executor: T) -> Self {
        self.models = Some(Arc::new(executor));
        self
    }

    /// Use the given notification sender.
    pub fn notification_sender<T: NotificationSender + 'static>(mut self, sender: T) -> Self {
        self.notifier = Some(Arc::new(sender));
        self
    }

    /// Use the given webhook caller.
    pub fn webhook_caller<T: WebhookCaller + 'static>(mut self, caller: T) -> Self {
        self.webhooks = Some(Arc::new(caller));
        self
    }

    /// Use the given rule store.
    pub fn rule_store<T: RuleStore + 'static>(self, store: T) -> Self {
        self.shared_rule_store(Arc::new(store))
    }

    /// Use a rule store shared with the caller.
    pub fn shared_rule_store(mut self, store: Arc<dyn RuleStore>) -> Self {
        self.rules = Some(store);
        self
    }

    /// Build the engine, filling unset collaborators with defaults.
    pub fn build(self) -> RuleEngine {
        let webhook_timeout = self.config.webhook_timeout;

        RuleEngine {
            inner: Arc::new(EngineInner {
                evaluator: ConditionEvaluator::new(),
                templates: TemplateResolver::new(),
                models: self
                    .models
                    .unwrap_or_else(|| Arc::new(UnconfiguredModelExecutor)),
                notifier: self
                    .notifier
                    .unwrap_or_else(|| Arc::new(LogNotificationSender)),
                webhooks: self
                    .webhooks
                    .unwrap_or_else(|| Arc::new(HttpWebhookCaller::new(webhook_timeout))),
                rules: self
                    .rules
                    .unwrap_or_else(|| Arc::new(InMemoryRuleStore::new())),
                config: self.config,
            }),
        }
    }
}

/// What happened inside a run, before timing and cost are attached.
#[derive(Debug, Default)]
struct RunOutcome {
    conditions_met: bool,
    results: Vec<ActionResult>,
    diagnostics: Vec<String>,
    error: Option<String>,
}

impl RuleEngine {
    /// Create an engine with default collaborators.
    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    /// Start building an engine.
    pub fn builder(config: EngineConfig) -> RuleEngineBuilder {
        RuleEngineBuilder {
            config,
            models: None,
            notifier: None,
            webhooks: None,
            rules: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn evaluator(&self) -> &ConditionEvaluator {
        &self.inner.evaluator
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.inner.templates
    }

    pub fn model_executor(&self) -> &dyn ModelExecutor {
        self.inner.models.as_ref()
    }

    pub fn notification_sender(&self) -> &dyn NotificationSender {
        self.inner.notifier.as_ref()
    }

    pub fn webhook_caller(&self) -> &dyn WebhookCaller {
        self.inner.webhooks.as_ref()
    }

    pub fn rule_store(&self) -> &dyn RuleStore {
        self.inner.rules.as_ref()
    }

    /// Run a rule against an input payload.
    ///
    /// Fails only when the rule is inactive; every other outcome is an
    /// [`ExecutionResult`].
    pub async fn run(
        &self,
        rule: &Rule,
        input: Value,
        trigger: TriggerKind,
    ) -> EngineResult<ExecutionResult> {
        if !rule.is_active {
            return Err(EngineError::RuleInactive(rule.id.clone()));
        }

        let scope = RunScope::root(rule, self.config().run_timeout);
        Ok(self.execute_run(rule, input, trigger, scope).await)
    }

    /// Look a rule up in the rule store and run it.
    pub async fn run_by_id(
        &self,
        rule_id: &str,
        input: Value,
        trigger: TriggerKind,
    ) -> EngineResult<ExecutionResult> {
        let rule = self.load_rule(rule_id).await?;
        self.run(&rule, input, trigger).await
    }

    /// Run a rule for an incoming webhook after checking its token and
    /// required input fields.
    pub async fn run_webhook(
        &self,
        rule_id: &str,
        token: &str,
        payload: Value,
    ) -> EngineResult<ExecutionResult> {
        let rule = self.load_rule(rule_id).await?;
        authorize_webhook(&rule, token, &payload)?;
        self.run(&rule, payload, TriggerKind::Webhook).await
    }

    /// Run a rule as a chained child of another run.
    pub(crate) fn run_chained<'a>(
        &'a self,
        rule: &'a Rule,
        input: Value,
        scope: RunScope,
    ) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(self.execute_run(rule, input, TriggerKind::Chained, scope))
    }

    async fn load_rule(&self, rule_id: &str) -> EngineResult<Rule> {
        self.rule_store()
            .get_rule(rule_id)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))
    }

    async fn execute_run(
        &self,
        rule: &Rule,
        input: Value,
        trigger: TriggerKind,
        scope: RunScope,
    ) -> ExecutionResult {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        tracing::info!(
            rule_id = %rule.id,
            execution_id = %execution_id,
            trigger = %trigger,
            depth = scope.depth(),
            "Rule run started"
        );

        let outcome = AssertUnwindSafe(self.evaluate_and_act(rule, &input, trigger, &scope, started_at))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| RunOutcome {
                error: Some(format!("Rule run panicked: {}", panic_message(panic.as_ref()))),
                ..RunOutcome::default()
            });

        let base_cost = rule.base_cost.unwrap_or(self.config().default_base_cost);
        let token_cost = token_cost(base_cost, &input, &outcome.results);
        let status = if outcome.error.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        let result = ExecutionResult {
            execution_id,
            rule_id: rule.id.clone(),
            trigger_type: trigger,
            started_at,
            conditions_met: outcome.conditions_met,
            action_results: outcome.results,
            status,
            execution_time_ms: start.elapsed().as_millis() as u64,
            token_cost,
            error_message: outcome.error,
            diagnostics: outcome.diagnostics,
        };

        match result.status {
            RunStatus::Completed => tracing::info!(
                rule_id = %rule.id,
                execution_id = %execution_id,
                conditions_met = result.conditions_met,
                actions = result.action_results.len(),
                execution_time_ms = result.execution_time_ms,
                token_cost = result.token_cost,
                "Rule run completed"
            ),
            RunStatus::Failed => tracing::error!(
                rule_id = %rule.id,
                execution_id = %execution_id,
                error = result.error_message.as_deref().unwrap_or(""),
                execution_time_ms = result.execution_time_ms,
                "Rule run failed"
            ),
        }

        result
    }

    async fn evaluate_and_act(
        &self,
        rule: &Rule,
        input: &Value,
        trigger: TriggerKind,
        scope: &RunScope,
        started_at: DateTime<Utc>,
    ) -> RunOutcome {
        let mut ctx = ExecutionContext::for_run(rule, input.clone(), trigger, started_at);

        let evaluation = self
            .evaluator()
            .evaluate_with_diagnostics(&rule.logic.conditions, &ctx);
        let diagnostics = evaluation
            .diagnostics
            .iter()
            .map(ToString::to_string)
            .collect();

        if !evaluation.matched {
            tracing::debug!(rule_id = %rule.id, "Conditions not met");
            return RunOutcome {
                conditions_met: false,
                diagnostics,
                ..RunOutcome::default()
            };
        }

        let actions = &rule.logic.actions;
        let (results, error) = match rule.execution_mode {
            ExecutionMode::Sequential => self.run_sequential(actions, &mut ctx, scope).await,
            ExecutionMode::Parallel => (self.run_parallel(actions, &ctx, scope).await, None),
        };

        RunOutcome {
            conditions_met: true,
            results,
            diagnostics,
            error,
        }
    }

    /// Declared order. A failed action ends the run unless its strategy is
    /// `continue`.
    async fn run_sequential(
        &self,
        actions: &[ActionDefinition],
        ctx: &mut ExecutionContext,
        scope: &RunScope,
    ) -> (Vec<ActionResult>, Option<String>) {
        let dispatcher = ActionDispatcher::new(self, scope);
        let mut results = Vec::with_capacity(actions.len());

        for action in actions {
            if scope.is_expired() {
                return (
                    results,
                    Some(format!("Run exceeded its {} ms budget", scope.budget_ms())),
                );
            }

            let result = dispatcher.dispatch(action, ctx).await;
            let halt = result.is_failed() && action.stops_on_failure();
            results.push(result);

            if halt {
                tracing::info!(
                    rule_id = %scope.rule_id(),
                    action_id = %action.id,
                    skipped = actions.len() - results.len(),
                    "Stopping after failed action"
                );
                break;
            }
        }

        (results, None)
    }

    /// One task per action, each with its own copy of the context, joined
    /// in declaration order.
    async fn run_parallel(
        &self,
        actions: &[ActionDefinition],
        ctx: &ExecutionContext,
        scope: &RunScope,
    ) -> Vec<ActionResult> {
        let workers = actions.len().min(self.config().max_parallel_actions).max(1);
        let semaphore = Arc::new(Semaphore::new(workers));

        tracing::debug!(
            rule_id = %scope.rule_id(),
            actions = actions.len(),
            workers,
            "Fanning out actions"
        );

        let handles: Vec<_> = actions
            .iter()
            .cloned()
            .map(|action| {
                let engine = self.clone();
                let scope = scope.clone();
                let mut ctx = ctx.clone();
                let semaphore = semaphore.clone();

                tokio::spawn(async move {
                    // Keep permit until done
                    let _permit = semaphore.acquire_owned().await;
                    ActionDispatcher::new(&engine, &scope)
                        .dispatch(&action, &mut ctx)
                        .await
                })
            })
            .collect();

        let mut results = Vec::with_capacity(actions.len());
        for (action, handle) in actions.iter().zip(handles) {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(action_id = %action.id, error = %e, "Action task aborted");
                    ActionResult::failed(
                        &action.id,
                        &action.action_type,
                        format!("Action task aborted: {}", e),
                    )
                }
            };
            results.push(result);
        }

        results
    }
}

/// `base + floor((|input| + |output|) / 100)` over compact JSON sizes.
fn token_cost(base_cost: u64, input: &Value, results: &[ActionResult]) -> u64 {
    let bytes = serialized_size(input) + serialized_size(results);
    base_cost + (bytes / BYTES_PER_COST_UNIT) as u64
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ErrorStrategy;
    use crate::condition::{ConditionNode, ConditionOperator};
    use crate::result::ActionStatus;
    use crate::rule::{RuleLogic, TriggerConfig};
    use crate::testing::{EchoModel, PanickingModel, SlowModel};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn amount_over(limit: i64) -> ConditionNode {
        ConditionNode::all(vec![ConditionNode::leaf(
            "input.amount",
            ConditionOperator::GreaterThan,
            json!(limit),
        )])
    }

    fn store(id: &str, key: &str, value: Value) -> ActionDefinition {
        ActionDefinition::new(id, "store-data", json!({"key": key, "value": value}))
    }

    /// Fails with a configuration error: no url.
    fn broken_webhook(id: &str) -> ActionDefinition {
        ActionDefinition::new(id, "call-webhook", json!({"method": "POST"}))
    }

    fn rule(id: &str, conditions: ConditionNode, actions: Vec<ActionDefinition>) -> Rule {
        Rule::new(id, id, RuleLogic { conditions, actions })
    }

    fn engine() -> RuleEngine {
        RuleEngine::new(EngineConfig::default())
    }

    #[tokio::test]
    async fn test_empty_group_always_fires() {
        for conditions in [ConditionNode::all(vec![]), ConditionNode::any(vec![])] {
            let rule = rule("r", conditions, vec![]);
            let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
            assert!(result.conditions_met);
            assert!(result.is_completed());
        }
    }

    #[tokio::test]
    async fn test_conditions_gate_actions() {
        let rule = rule("r", amount_over(100), vec![store("a1", "seen", json!(true))]);

        let fired = engine().run(&rule, json!({"amount": 150}), TriggerKind::Manual).await.unwrap();
        assert!(fired.conditions_met);
        assert_eq!(fired.action_results.len(), 1);

        let skipped = engine().run(&rule, json!({"amount": 50}), TriggerKind::Manual).await.unwrap();
        assert!(!skipped.conditions_met);
        assert!(skipped.action_results.is_empty());
        assert_eq!(skipped.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_sequential_stop_skips_rest() {
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![broken_webhook("A"), store("B", "k", json!(1))],
        );

        let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action_results.len(), 1);
        assert_eq!(result.action_results[0].action_id, "A");
        assert_eq!(result.action_results[0].status, ActionStatus::Failed);
        assert!(result.action("B").is_none());
        assert_eq!(result.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_sequential_continue_runs_rest() {
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![
                broken_webhook("A").with_strategy(ErrorStrategy::Continue),
                store("B", "k", json!(1)),
            ],
        );

        let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action_results.len(), 2);
        assert!(result.action("A").unwrap().is_failed());
        assert!(result.action("B").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_unsupported_action_does_not_stop_run() {
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![
                ActionDefinition::new("A", "send-fax", json!({})),
                store("B", "k", json!(1)),
            ],
        );

        let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action("A").unwrap().status, ActionStatus::Unsupported);
        assert!(result.action("B").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_output_variables_flow_to_later_actions() {
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![
                ActionDefinition::new(
                    "shout",
                    "transform-data",
                    json!({"transformations": {"name": {"source": "input.name", "operation": "uppercase"}}}),
                )
                .with_output_variable("loud"),
                store("greet", "greeting", json!("HELLO {{loud.name}}")),
            ],
        );

        let result = engine().run(&rule, json!({"name": "ada"}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action("greet").unwrap().output["value"], json!("HELLO ADA"));
    }

    #[tokio::test]
    async fn test_token_cost_formula_and_determinism() {
        let rule = rule("r", ConditionNode::default(), vec![store("a", "k", json!("v"))])
            .with_base_cost(3);
        let input = json!({"amount": 150});

        let first = engine().run(&rule, input.clone(), TriggerKind::Manual).await.unwrap();
        let second = engine().run(&rule, input.clone(), TriggerKind::Manual).await.unwrap();

        let expected = 3 + ((serialized_size(&input) + serialized_size(&first.action_results)) / 100) as u64;
        assert_eq!(first.token_cost, expected);
        assert_eq!(first.token_cost, second.token_cost);
    }

    #[tokio::test]
    async fn test_default_base_cost_applies() {
        let rule = rule("r", amount_over(1000), vec![]);
        let result = engine().run(&rule, json!({"amount": 1}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.token_cost, EngineConfig::default().default_base_cost);
    }

    #[tokio::test]
    async fn test_inactive_rule_is_rejected() {
        let mut rule = rule("r", ConditionNode::default(), vec![]);
        rule.is_active = false;
        let err = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap_err();
        assert!(matches!(err, EngineError::RuleInactive(ref id) if id == "r"));
    }

    #[tokio::test]
    async fn test_run_by_id_unknown_rule() {
        let err = engine()
            .run_by_id("ghost", json!({}), TriggerKind::Manual)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RuleNotFound(_)));
    }

    #[tokio::test]
    async fn test_chained_result_is_embedded() {
        let child = rule("child", ConditionNode::default(), vec![store("c1", "k", json!("{{input.x}}"))]);
        let parent = rule(
            "parent",
            ConditionNode::default(),
            vec![ActionDefinition::new(
                "chain",
                "trigger-rule",
                json!({"ruleId": "child", "inputMapping": {"x": "{{input.amount}}"}}),
            )],
        );

        let engine = RuleEngine::builder(EngineConfig::default())
            .rule_store(InMemoryRuleStore::with_rules(vec![child]))
            .build();

        let result = engine.run(&parent, json!({"amount": 7}), TriggerKind::Manual).await.unwrap();
        let action = result.action("chain").unwrap();
        assert!(action.is_success());
        assert_eq!(action.output["ruleId"], json!("child"));
        assert_eq!(action.output["triggerType"], json!("chained"));
        assert_eq!(action.output["actionResults"][0]["output"]["value"], json!("7"));
        // Only the parent result exists at the top level.
        assert_eq!(result.rule_id, "parent");
        assert_eq!(result.action_results.len(), 1);
    }

    #[tokio::test]
    async fn test_self_trigger_is_a_cycle() {
        let looping = rule(
            "loop",
            ConditionNode::default(),
            vec![ActionDefinition::new("again", "trigger-rule", json!({"ruleId": "loop"}))],
        );
        let engine = RuleEngine::builder(EngineConfig::default())
            .rule_store(InMemoryRuleStore::with_rules(vec![looping.clone()]))
            .build();

        let result = engine.run(&looping, json!({}), TriggerKind::Manual).await.unwrap();
        let action = result.action("again").unwrap();
        assert!(action.is_failed());
        assert!(action.error.as_deref().unwrap().contains("cycle detected"));
        assert!(result.is_completed());
    }

    #[tokio::test]
    async fn test_chain_depth_limit() {
        let link = |id: &str, next: &str| {
            rule(
                id,
                ConditionNode::default(),
                vec![ActionDefinition::new("next", "trigger-rule", json!({"ruleId": next}))],
            )
        };
        let rules = vec![link("r0", "r1"), link("r1", "r2"), link("r2", "r3"), link("r3", "r4")];
        let engine = RuleEngine::builder(EngineConfig::default().with_max_chain_depth(2))
            .rule_store(InMemoryRuleStore::with_rules(rules.clone()))
            .build();

        let result = engine.run(&rules[0], json!({}), TriggerKind::Manual).await.unwrap();

        // r0 -> r1 (depth 1) -> r2 (depth 2) -> r3 rejected.
        let r1 = &result.action_results[0].output;
        let r2 = &r1["actionResults"][0]["output"];
        let rejected = &r2["actionResults"][0];
        assert_eq!(rejected["status"], json!("failed"));
        assert!(rejected["error"].as_str().unwrap().contains("maximum chain depth 2"));
    }

    #[tokio::test]
    async fn test_chained_rule_missing_or_inactive() {
        let mut dormant = rule("dormant", ConditionNode::default(), vec![]);
        dormant.is_active = false;
        let parent = rule(
            "parent",
            ConditionNode::default(),
            vec![
                ActionDefinition::new("a", "trigger-rule", json!({"ruleId": "nowhere"}))
                    .with_strategy(ErrorStrategy::Continue),
                ActionDefinition::new("b", "trigger-rule", json!({"ruleId": "dormant"})),
            ],
        );
        let engine = RuleEngine::builder(EngineConfig::default())
            .rule_store(InMemoryRuleStore::with_rules(vec![dormant]))
            .build();

        let result = engine.run(&parent, json!({}), TriggerKind::Manual).await.unwrap();
        assert!(result.action("a").unwrap().error.as_deref().unwrap().contains("Rule not found"));
        assert!(result.action("b").unwrap().error.as_deref().unwrap().contains("inactive"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_keeps_declaration_order() {
        let model = SlowModel::default();
        let in_flight = model.max_in_flight.clone();
        let engine = RuleEngine::builder(EngineConfig::default())
            .model_executor(model)
            .build();

        let rule = rule(
            "fan",
            ConditionNode::default(),
            vec![
                ActionDefinition::new("slow", "trigger-model", json!({"modelId": "m", "inputMapping": {"delay_ms": 80}})),
                ActionDefinition::new("fast", "trigger-model", json!({"modelId": "m", "inputMapping": {"delay_ms": 5}})),
                ActionDefinition::new("medium", "trigger-model", json!({"modelId": "m", "inputMapping": {"delay_ms": 40}})),
            ],
        )
        .with_mode(ExecutionMode::Parallel);

        let result = engine.run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        let ids: Vec<_> = result.action_results.iter().map(|r| r.action_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast", "medium"]);
        assert!(result.action_results.iter().all(ActionResult::is_success));
        assert_eq!(in_flight.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_respects_worker_cap() {
        let model = SlowModel::default();
        let in_flight = model.max_in_flight.clone();
        let engine = RuleEngine::builder(EngineConfig::default().with_max_parallel_actions(2))
            .model_executor(model)
            .build();

        let actions = (0..5)
            .map(|i| {
                ActionDefinition::new(
                    format!("m{}", i),
                    "trigger-model",
                    json!({"modelId": "m", "inputMapping": {"delay_ms": 10}}),
                )
            })
            .collect();
        let rule = rule("capped", ConditionNode::default(), actions).with_mode(ExecutionMode::Parallel);

        let result = engine.run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action_results.len(), 5);
        assert_eq!(in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_parallel_isolation_and_no_cancellation() {
        let rule = rule(
            "p",
            ConditionNode::default(),
            vec![
                store("x", "x", json!("1")).with_output_variable("x_out"),
                broken_webhook("boom"),
                store("y", "y", json!("{{x}}|{{x_out.value}}")),
            ],
        )
        .with_mode(ExecutionMode::Parallel);

        let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.action_results.len(), 3);
        assert!(result.action("boom").unwrap().is_failed());
        assert_eq!(
            result.action("y").unwrap().output["value"],
            json!("{{x}}|{{x_out.value}}")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_timeout_is_failed_action() {
        let engine = RuleEngine::builder(
            EngineConfig::default().with_run_timeout(Duration::from_millis(100)),
        )
        .model_executor(SlowModel::default())
        .build();

        let rule = rule(
            "slow",
            ConditionNode::default(),
            vec![ActionDefinition::new(
                "wait",
                "trigger-model",
                json!({"modelId": "m", "inputMapping": {"delay_ms": 5000}}),
            )
            .with_strategy(ErrorStrategy::Continue)],
        );

        let result = engine.run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        let action = result.action("wait").unwrap();
        assert!(action.is_failed());
        assert!(action.error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_timeout_fails_parent_action() {
        let child = rule(
            "child",
            ConditionNode::default(),
            vec![ActionDefinition::new(
                "wait",
                "trigger-model",
                json!({"modelId": "m", "inputMapping": {"delay_ms": 5000}}),
            )],
        );
        let parent = rule(
            "parent",
            ConditionNode::default(),
            vec![ActionDefinition::new("chain", "trigger-rule", json!({"ruleId": "child"}))],
        );
        let engine = RuleEngine::builder(
            EngineConfig::default().with_run_timeout(Duration::from_millis(200)),
        )
        .model_executor(SlowModel::default())
        .rule_store(InMemoryRuleStore::with_rules(vec![child]))
        .build();

        let result = engine.run(&parent, json!({}), TriggerKind::Manual).await.unwrap();
        assert!(result.is_completed());

        let chain = result.action("chain").unwrap();
        assert!(chain.is_failed());
        assert!(chain.error.as_deref().unwrap().contains("timed out"));
        // The nested result is still reported.
        assert_eq!(chain.output["ruleId"], json!("child"));
        assert_eq!(chain.output["actionResults"][0]["status"], json!("failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nested_run_within_budget_succeeds() {
        let child = rule(
            "child",
            ConditionNode::default(),
            vec![ActionDefinition::new(
                "wait",
                "trigger-model",
                json!({"modelId": "m", "inputMapping": {"delay_ms": 50}}),
            )],
        );
        let parent = rule(
            "parent",
            ConditionNode::default(),
            vec![ActionDefinition::new("chain", "trigger-rule", json!({"ruleId": "child"}))],
        );
        let engine = RuleEngine::builder(
            EngineConfig::default().with_run_timeout(Duration::from_millis(200)),
        )
        .model_executor(SlowModel::default())
        .rule_store(InMemoryRuleStore::with_rules(vec![child]))
        .build();

        let result = engine.run(&parent, json!({}), TriggerKind::Manual).await.unwrap();
        assert!(result.action("chain").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_panic_becomes_failed_run() {
        let engine = RuleEngine::builder(EngineConfig::default())
            .model_executor(PanickingModel)
            .build();
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![ActionDefinition::new("m", "trigger-model", json!({"modelId": "x"}))],
        );

        let result = engine.run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.error_message.as_deref().unwrap().contains("model exploded"));
    }

    #[tokio::test]
    async fn test_panic_in_parallel_is_failed_action() {
        let engine = RuleEngine::builder(EngineConfig::default())
            .model_executor(PanickingModel)
            .build();
        let rule = rule(
            "r",
            ConditionNode::default(),
            vec![
                ActionDefinition::new("m", "trigger-model", json!({"modelId": "x"})),
                store("s", "k", json!(1)),
            ],
        )
        .with_mode(ExecutionMode::Parallel);

        let result = engine.run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert!(result.is_completed());
        assert!(result.action("m").unwrap().is_failed());
        assert!(result.action("s").unwrap().is_success());
    }

    #[tokio::test]
    async fn test_run_webhook_gate() {
        let mut hook = rule("hook", amount_over(10), vec![]);
        hook.trigger_config = TriggerConfig {
            trigger_type: TriggerKind::Webhook,
            webhook_token: Some("tok".to_string()),
            input_schema: None,
        };
        let engine = RuleEngine::builder(EngineConfig::default())
            .model_executor(EchoModel)
            .rule_store(InMemoryRuleStore::with_rules(vec![hook]))
            .build();

        let result = engine.run_webhook("hook", "tok", json!({"amount": 11})).await.unwrap();
        assert_eq!(result.trigger_type, TriggerKind::Webhook);
        assert!(result.conditions_met);

        let err = engine.run_webhook("hook", "nope", json!({"amount": 11})).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidWebhookToken(_)));
    }

    #[tokio::test]
    async fn test_condition_diagnostics_are_reported() {
        let rule = rule(
            "r",
            ConditionNode::any(vec![ConditionNode::leaf(
                "input.missing",
                ConditionOperator::GreaterThan,
                json!(1),
            )]),
            vec![],
        );
        let result = engine().run(&rule, json!({}), TriggerKind::Manual).await.unwrap();
        assert!(!result.conditions_met);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.is_completed());
    }

    #[test]
    fn test_scope_chain_checks() {
        let root_rule = rule("a", ConditionNode::default(), vec![]);
        let root = RunScope::root(&root_rule, Duration::from_secs(5));
        assert!(root.check_chain("b", 1).is_ok());
        assert!(matches!(root.check_chain("a", 5), Err(ChainError::Cycle { .. })));

        let child = root.child(&rule("b", ConditionNode::default(), vec![]), Duration::from_secs(60));
        assert_eq!(child.depth(), 1);
        assert_eq!(child.chain(), &["a".to_string(), "b".to_string()]);
        assert!(child.deadline() <= root.deadline());
        assert!(matches!(
            child.check_chain("c", 1),
            Err(ChainError::DepthExceeded { max_depth: 1, .. })
        ));
    }
}
