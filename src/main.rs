//! spendguard-audit - traffic generation and billing reconciliation for SpendGuard
//!
//! ## Usage
//!
//! ```bash
//! # Provision a budgeted agent (and optionally a run)
//! spendguard-audit bootstrap --limit 500 --create-run
//!
//! # Send metered traffic and print the window it covered
//! spendguard-audit traffic --n 5 --sleep-seconds 0.5
//!
//! # Reconcile the ledger against provider exports
//! spendguard-audit reconcile --sqlite cynsta-spendguard.db \
//!     --start 2026-02-10T01:00:00Z --end 2026-02-10T02:00:00Z \
//!     --openai-csv openai-export.csv
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use spendguard_client::{
    BudgetSpec, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL, GuardClient, GuardConfig,
    ProvisionError, ProvisioningPlan, ProvisioningWorkflow, RunMode, TrafficGenerator,
    TrafficPlan,
};
use spendguard_core::{AuditError, LogGuard, ReconciliationWindow, init_logging};
use spendguard_ledger::{LedgerQuery, LedgerStore, ProviderKind, import_all, reconcile};
use tracing::{error, info, warn};

/// Traffic generation and billing reconciliation for the SpendGuard budget proxy
#[derive(Parser, Debug)]
#[command(name = "spendguard-audit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.spendguard/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// YAML file with base_url, api_key and timeout_secs
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an agent with a strict budget, optionally with a run
    Bootstrap(BootstrapArgs),

    /// Send metered requests through the guard and print the reconciliation window
    Traffic(TrafficArgs),

    /// Compare ledger totals with provider cost exports
    Reconcile(ReconcileArgs),
}

/// Connection settings shared by commands that talk to the guard.
#[derive(Args, Debug)]
struct GuardArgs {
    /// Guard base URL [default: http://127.0.0.1:8787]
    #[arg(long, env = "CAP_BASE_URL")]
    base_url: Option<String>,

    /// API key for hosted deployments
    #[arg(long, env = "CAP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-call timeout in seconds [default: 60]
    #[arg(long)]
    timeout_secs: Option<u64>,
}

impl GuardArgs {
    /// Flags and environment override the config file, which overrides defaults.
    fn resolve(&self, config_path: Option<&Path>) -> anyhow::Result<GuardConfig> {
        let mut config = match config_path {
            Some(path) => GuardConfig::load(path)?,
            None => GuardConfig::default(),
        };
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config = config.with_timeout_secs(timeout_secs);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct BootstrapArgs {
    #[command(flatten)]
    guard: GuardArgs,

    /// Agent name
    #[arg(long, default_value = "strict-budget-agent")]
    name: String,

    /// Hard limit in cents
    #[arg(long)]
    limit: i64,

    /// Topup in cents (defaults to --limit)
    #[arg(long)]
    topup: Option<i64>,

    /// Skip the /health check before provisioning
    #[arg(long)]
    skip_health_check: bool,

    /// Create a run and include its run_id in the output
    #[arg(long)]
    create_run: bool,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct TrafficArgs {
    #[command(flatten)]
    guard: GuardArgs,

    /// Agent name
    #[arg(long, default_value = "traffic-test")]
    agent_name: String,

    /// Model name (must be priced by the guard)
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Number of requests to send
    #[arg(long, default_value_t = 1)]
    n: u32,

    /// Requested max_output_tokens
    #[arg(long, default_value_t = DEFAULT_MAX_OUTPUT_TOKENS)]
    max_output_tokens: u32,

    /// Delay between requests
    #[arg(long, default_value_t = 0.5)]
    sleep_seconds: f64,

    /// Agent hard limit in cents
    #[arg(long, default_value_t = 500)]
    hard_limit_cents: i64,

    /// Agent topup in cents (defaults to --hard-limit-cents)
    #[arg(long)]
    topup_cents: Option<i64>,

    /// Optional reasoning.effort value (e.g. low|medium|high)
    #[arg(long)]
    reasoning_effort: Option<String>,

    /// Create a fresh run for every request instead of sharing one
    #[arg(long)]
    run_per_request: bool,

    /// Skip the /health check before provisioning
    #[arg(long)]
    skip_health_check: bool,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Path to the guard's SQLite database (cap_usage_ledger)
    #[arg(long)]
    sqlite: PathBuf,

    /// UTC ISO start timestamp, inclusive (defaults to one hour before --end)
    #[arg(long)]
    start: Option<String>,

    /// UTC ISO end timestamp, inclusive (defaults to now)
    #[arg(long)]
    end: Option<String>,

    /// OpenAI export CSV with columns model,cost_usd
    #[arg(long)]
    openai_csv: Option<PathBuf>,

    /// Anthropic export CSV with columns model,cost_usd
    #[arg(long)]
    anthropic_csv: Option<PathBuf>,

    /// Gemini export CSV with columns model,cost_usd
    #[arg(long)]
    gemini_csv: Option<PathBuf>,

    /// Only reconcile this provider (ledger rows and export sums)
    #[arg(long)]
    provider: Option<String>,

    /// Only reconcile this model (ledger rows and export sums)
    #[arg(long)]
    model: Option<String>,

    /// Output JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    let config_path = cli.config.as_deref();
    let result = match &cli.command {
        Command::Bootstrap(args) => run_bootstrap(args, config_path).await,
        Command::Traffic(args) => run_traffic(args, config_path).await,
        Command::Reconcile(args) => run_reconcile(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("spendguard-audit failed: {:#}", e);
            eprintln!("Error: {}", error_message(&e));
            print_guidance(&e);
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> spendguard_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

/// One-line error text, in the client's friendly wording for workflow failures.
fn error_message(e: &anyhow::Error) -> String {
    match e.downcast_ref::<ProvisionError>() {
        Some(failure) => format!("{} failed: {}", failure.step, failure.source.friendly_message()),
        None => e.to_string(),
    }
}

/// Print follow-up hints for errors that carry them.
fn print_guidance(e: &anyhow::Error) {
    if let Some(failure) = e.downcast_ref::<ProvisionError>() {
        if let Some(agent_id) = &failure.agent_id {
            eprintln!("Note: agent {agent_id} was created and left in place");
        }
        eprintln!("Hint: {}", failure.source.suggested_action());
    } else if let Some(hint) = e.downcast_ref::<AuditError>().and_then(AuditError::guidance) {
        eprintln!("Hint: {hint}");
    }
}

async fn run_bootstrap(args: &BootstrapArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let budget = BudgetSpec::new(args.limit, args.topup)?;
    let config = args.guard.resolve(config_path)?;
    let client = GuardClient::new(&config)?;

    info!(base_url = %client.base_url(), name = %args.name, "Bootstrapping strict-budget agent");

    let plan = ProvisioningPlan::new(args.name.clone(), budget)
        .with_health_check(!args.skip_health_check)
        .with_run(args.create_run);
    let provisioned = ProvisioningWorkflow::new(&client, plan).run().await?;

    if args.json {
        let output = serde_json::json!({
            "base_url": client.base_url(),
            "agent_id": provisioned.agent_id,
            "budget": provisioned.budget,
            "run": provisioned.run,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let field = |name: &str| {
        provisioned
            .budget
            .raw
            .get(name)
            .map_or_else(|| "null".to_string(), |value| value.to_string())
    };
    println!("agent_id={}", provisioned.agent_id);
    println!("hard_limit_cents={}", field("hard_limit_cents"));
    println!("remaining_cents={}", field("remaining_cents"));
    if let Some(run) = &provisioned.run {
        println!("run_id={}", run.run_id);
    }
    println!("export_SPENDGUARD_AGENT_ID={}", provisioned.agent_id);
    Ok(())
}

async fn run_traffic(args: &TrafficArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let budget = BudgetSpec::new(args.hard_limit_cents, args.topup_cents)?;
    let delay = Duration::try_from_secs_f64(args.sleep_seconds)
        .with_context(|| format!("invalid --sleep-seconds {}", args.sleep_seconds))?;
    let run_mode = if args.run_per_request {
        RunMode::PerRequest
    } else {
        RunMode::Shared
    };

    let plan = TrafficPlan::new(args.agent_name.clone(), budget)
        .with_model(args.model.clone())
        .with_requests(args.n)
        .with_max_output_tokens(args.max_output_tokens)
        .with_reasoning_effort(args.reasoning_effort.clone())
        .with_delay(delay)
        .with_run_mode(run_mode)
        .with_health_check(!args.skip_health_check);
    plan.validate()?;

    let config = args.guard.resolve(config_path)?;
    let client = GuardClient::new(&config)?;
    info!(base_url = %client.base_url(), requests = args.n, model = %args.model, "Generating traffic");

    let report = TrafficGenerator::new(&client, plan)?.run().await?;

    if args.json {
        let mut output = serde_json::to_value(&report)?;
        output["reconcile_hint"] = serde_json::Value::String(report.reconcile_hint());
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("SpendGuard traffic generated.");
    println!("agent_id: {}", report.agent_id);
    println!("requests_sent: {}", report.requests_sent);
    println!("run_ids: {}", report.run_ids.join(", "));
    println!("window_start_utc: {}", report.window.start_iso());
    println!("window_end_utc:   {}", report.window.end_iso());
    println!();
    println!("Next: export provider usage/cost for this window, then run reconciliation:");
    println!("  {}", report.reconcile_hint());
    Ok(())
}

fn run_reconcile(args: &ReconcileArgs) -> anyhow::Result<()> {
    let window =
        ReconciliationWindow::resolve(args.start.as_deref(), args.end.as_deref(), Utc::now())?;

    let mut query = LedgerQuery::new(window);
    if let Some(provider) = &args.provider {
        query = query.with_provider(provider.clone());
    }
    if let Some(model) = &args.model {
        query = query.with_model(model.clone());
    }

    let store = LedgerStore::new(&args.sqlite);
    let extract = store
        .extract_with_stats(&query)
        .map_err(|e| anyhow::anyhow!(e.friendly_message()))?;

    let exports: Vec<(ProviderKind, PathBuf)> = [
        (ProviderKind::OpenAi, &args.openai_csv),
        (ProviderKind::Anthropic, &args.anthropic_csv),
        (ProviderKind::Gemini, &args.gemini_csv),
    ]
    .into_iter()
    .filter_map(|(kind, path)| path.clone().map(|path| (kind, path)))
    .collect();
    if exports.is_empty() {
        warn!("No provider exports given; every ledger row will show as drift");
    }

    let mut batch = import_all(exports);
    batch.retain_keys(|key| query.matches(key));
    let report = reconcile(&extract.rows, batch.sums)
        .with_window(window)
        .with_degraded_rows(extract.degraded_rows)
        .with_import_failures(batch.failures);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print!("{report}");
    }

    for failure in &report.import_failures {
        eprintln!(
            "Warning: {} export {} was not imported: {}",
            failure.provider,
            failure.path.display(),
            failure.message
        );
    }
    if report.degraded_row_count > 0 {
        eprintln!(
            "Warning: {} ledger row(s) had unusable metadata and were counted as 0",
            report.degraded_row_count
        );
    }

    if report.is_empty() {
        info!(window = %window, "Nothing to reconcile in window");
    }
    Ok(())
}
