//! Engine configuration.

use std::time::Duration;

/// Rule engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum nesting depth of `trigger-rule` chains.
    pub max_chain_depth: usize,

    /// Per-run timeout. Nested runs inherit the parent's deadline.
    pub run_timeout: Duration,

    /// Upper bound on concurrently running actions in parallel mode.
    pub max_parallel_actions: usize,

    /// Base cost for rules that do not declare one.
    pub default_base_cost: u64,

    /// HTTP timeout for outbound webhook calls.
    pub webhook_timeout: Duration,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_chain_depth = env_parse("RULEFLOW_MAX_CHAIN_DEPTH").unwrap_or(defaults.max_chain_depth);

        let run_timeout = env_parse("RULEFLOW_RUN_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.run_timeout);

        let max_parallel_actions: usize = env_parse("RULEFLOW_MAX_PARALLEL_ACTIONS")
            .unwrap_or(defaults.max_parallel_actions);

        let default_base_cost =
            env_parse("RULEFLOW_DEFAULT_BASE_COST").unwrap_or(defaults.default_base_cost);

        let webhook_timeout = env_parse("RULEFLOW_WEBHOOK_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.webhook_timeout);

        Self {
            max_chain_depth,
            run_timeout,
            max_parallel_actions: max_parallel_actions.max(1),
            default_base_cost,
            webhook_timeout,
        }
    }

    /// Set the maximum chain depth.
    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Set the per-run timeout.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the parallel fan-out cap.
    pub fn with_max_parallel_actions(mut self, cap: usize) -> Self {
        self.max_parallel_actions = cap.max(1);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: 5,
            run_timeout: Duration::from_secs(30),
            max_parallel_actions: 8,
            default_base_cost: 1,
            webhook_timeout: Duration::from_secs(10),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
