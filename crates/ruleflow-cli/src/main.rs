//! Ruleflow CLI.
//!
//! Runs rule documents against a local engine and prints the execution
//! result as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ruleflow_engine::{EngineConfig, ExecutionResult, InMemoryRuleStore, Rule, RuleEngine, TriggerKind};

#[derive(Parser)]
#[command(name = "ruleflow")]
#[command(version, about = "Ruleflow rule runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a rule against an input payload
    ///
    /// Examples:
    ///     ruleflow run --rule rules/large-order.yaml --payload '{"amount": 150}'
    ///     ruleflow run --rule rules/router.json --input order.json --rules-dir rules/
    #[command(verbatim_doc_comment)]
    Run {
        #[command(flatten)]
        source: RuleSource,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Trigger kind recorded on the run: manual, webhook, chained
        #[arg(short, long, default_value = "manual")]
        trigger: TriggerKind,
    },

    /// Run a webhook-triggered rule after checking its token and inputs
    Webhook {
        #[command(flatten)]
        source: RuleSource,

        #[command(flatten)]
        payload: PayloadArgs,

        /// Token presented by the caller
        #[arg(long)]
        token: String,
    },

    /// Validate a rule document without running it
    Validate {
        /// Rule file (YAML or JSON)
        #[arg(short, long)]
        rule: PathBuf,
    },
}

#[derive(Args)]
struct RuleSource {
    /// Rule file (YAML or JSON)
    #[arg(short, long)]
    rule: PathBuf,

    /// Directory of rule files available to trigger-rule actions
    #[arg(long)]
    rules_dir: Option<PathBuf>,
}

#[derive(Args)]
struct PayloadArgs {
    /// Path to JSON file with the trigger input
    #[arg(short, long, conflicts_with = "payload")]
    input: Option<PathBuf>,

    /// Trigger input as JSON string
    #[arg(long, value_name = "JSON")]
    payload: Option<String>,
}

impl PayloadArgs {
    fn load(&self) -> Result<Value> {
        if let Some(ref path) = self.input {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file {}", path.display()))?;
            return serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()));
        }

        match self.payload {
            Some(ref raw) => serde_json::from_str(raw).context("Invalid JSON in --payload"),
            None => Ok(Value::Object(Default::default())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            source,
            payload,
            trigger,
        } => {
            let rule = load_rule(&source.rule)?;
            let engine = build_engine(&rule, source.rules_dir.as_deref())?;
            let result = engine.run(&rule, payload.load()?, trigger).await?;
            print_result(&result)
        }
        Commands::Webhook {
            source,
            payload,
            token,
        } => {
            let rule = load_rule(&source.rule)?;
            let engine = build_engine(&rule, source.rules_dir.as_deref())?;
            let result = engine.run_webhook(&rule.id, &token, payload.load()?).await?;
            print_result(&result)
        }
        Commands::Validate { rule } => {
            let parsed = load_rule(&rule)?;
            println!(
                "Rule '{}' ({}) is valid: {} action(s), {} mode",
                parsed.name,
                parsed.id,
                parsed.logic.actions.len(),
                serde_json::to_value(parsed.execution_mode)?
                    .as_str()
                    .unwrap_or("sequential")
            );
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,ruleflow_engine=debug".into());

    // Logs go to stderr so stdout stays a clean JSON result.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Engine whose rule store holds the rules of `rules_dir` plus `rule` itself.
fn build_engine(rule: &Rule, rules_dir: Option<&Path>) -> Result<RuleEngine> {
    let config = EngineConfig::from_env();
    tracing::debug!(
        max_chain_depth = config.max_chain_depth,
        run_timeout_secs = config.run_timeout.as_secs(),
        max_parallel_actions = config.max_parallel_actions,
        "Engine configuration loaded"
    );

    let mut rules = match rules_dir {
        Some(dir) => load_rules_dir(dir)?,
        None => Vec::new(),
    };
    rules.retain(|r| r.id != rule.id);
    rules.push(rule.clone());

    Ok(RuleEngine::builder(config)
        .rule_store(InMemoryRuleStore::with_rules(rules))
        .build())
}

fn load_rule(path: &Path) -> Result<Rule> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule file {}", path.display()))?;

    let rule = parse_rule(&raw, is_json(path))
        .with_context(|| format!("Failed to load rule {}", path.display()))?;

    Ok(rule)
}

/// Parse and validate a rule document.
fn parse_rule(raw: &str, json: bool) -> Result<Rule> {
    let rule: Rule = if json {
        serde_json::from_str(raw).context("Invalid rule JSON")?
    } else {
        serde_yaml::from_str(raw).context("Invalid rule YAML")?
    };

    rule.validate()
        .with_context(|| format!("Rule {} is invalid", rule.id))?;

    Ok(rule)
}

fn load_rules_dir(dir: &Path) -> Result<Vec<Rule>> {
    if !dir.is_dir() {
        bail!("Rules directory not found: {}", dir.display());
    }

    let mut rules = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_rule_file = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json" | "yaml" | "yml")
        );
        if !is_rule_file {
            continue;
        }

        let rule = load_rule(&path)?;
        tracing::debug!(rule_id = %rule.id, path = %path.display(), "Loaded rule");
        rules.push(rule);
    }

    tracing::info!(count = rules.len(), dir = %dir.display(), "Rules directory loaded");
    Ok(rules)
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    let rendered = serde_json::to_string_pretty(result).context("Failed to render result")?;
    println!("{}", rendered);
    Ok(())
}
