//! Fleet - build, version, install and publish a service fleet
//!
//! The `fleet` command drives one release of the whole fleet from the local
//! checkouts.
//!
//! ## Commands
//!
//! - `build`: plan, build, install, commit/tag and publish
//! - `plan`: print what `build` would do
//! - `versions`: show the resolved version of every service

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_ci::BuildPipelineRunner;
use fleet_core::lease::LeaseManager;
use fleet_core::telemetry::{init_tracing, level_for, LogFormat};
use fleet_core::{
    BuildOrchestrator, BuildPlan, BuildReport, Collaborators, DistributionOutcome, FleetConfig,
    IncrementKind, PlanOptions, RunContext, DEFAULT_CONFIG_FILE,
};
use fleet_exec::{
    CommandRunner, LogNotifier, Notifier, OllamaMessageGenerator, SystemRunner, WebhookNotifier,
};
use fleet_state::{FsCoordinationStore, JsonManifestStore};

#[derive(Parser)]
#[command(name = "fleet")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, version, install and publish a service fleet", long_about = None)]
struct Cli {
    /// Fleet configuration file
    #[arg(long, global = true, env = "FLEET_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, install, commit, tag and publish changed services
    Build(BuildArgs),

    /// Show the build plan without running anything
    Plan(BuildArgs),

    /// Show the resolved version of every service
    Versions,
}

#[derive(Args, Debug, Clone)]
struct BuildArgs {
    /// major, minor or patch; omitted means patch over changed services
    increment: Option<String>,

    /// Skip the exclusivity wait and rebuild every buildable service
    #[arg(short, long)]
    force: bool,

    /// Also build the CLI entry point
    #[arg(long)]
    source: bool,
}

impl BuildArgs {
    fn plan_options(&self) -> Result<PlanOptions> {
        Ok(PlanOptions {
            increment: IncrementKind::from_arg(self.increment.as_deref())?,
            force: self.force,
            include_source: self.source,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(LogFormat::from_json_flag(cli.json), level_for(cli.verbose));

    let config = FleetConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    match cli.command {
        Commands::Build(args) => cmd_build(&config, &args).await,
        Commands::Plan(args) => cmd_plan(&config, &args).await,
        Commands::Versions => cmd_versions(&config).await,
    }
}

fn orchestrator(config: &FleetConfig) -> Result<BuildOrchestrator> {
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner::new());
    let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone()).context("Failed to set up webhook notifier")?,
        ),
        None => Arc::new(LogNotifier),
    };
    let messages = OllamaMessageGenerator::new(config.llm.clone())
        .context("Failed to set up commit message generator")?;

    Ok(BuildOrchestrator::new(
        config,
        Collaborators {
            runner: runner.clone(),
            pipeline: Arc::new(BuildPipelineRunner::new(
                runner.clone(),
                config.systemd.user,
                config.paths.bin_dir.clone(),
            )),
            messages: Arc::new(messages),
            notifier,
            manifest: Arc::new(JsonManifestStore::new(config.manifest_path())),
        },
    ))
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted; stopping after the current step");
            token.cancel();
        }
    });
}

async fn cmd_build(config: &FleetConfig, args: &BuildArgs) -> Result<()> {
    let opts = args.plan_options()?;
    let orchestrator = orchestrator(config)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let ctx = RunContext::with_cancel(env!("CARGO_PKG_VERSION"), cancel);

    // A no-op never needs the lease.
    if orchestrator.plan(opts).await.is_noop() {
        println!("Nothing to build.");
        return Ok(());
    }

    let store = FsCoordinationStore::new(&config.coordination.dir)
        .with_context(|| format!("Failed to open {}", config.coordination.dir.display()))?;
    let lease = LeaseManager::from_config(Arc::new(store), ctx.run_id.clone(), &config.coordination);
    let guard = if args.force {
        lease.acquire_forced().await
    } else {
        info!("waiting for the fleet to be free");
        lease.acquire(&ctx.cancel).await
    }
    .context("Failed to acquire build lease")?;

    let result = orchestrator.run(&ctx, opts).await;
    if let Err(e) = guard.release().await {
        warn!(error = %e, "lease release failed; markers will expire");
    }
    let report = result.context("Build failed")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &BuildReport) {
    if report.is_noop() {
        println!("Nothing to build.");
        return;
    }
    println!("Build {} ({})", report.run_id, report.plan.increment);
    print!("{}", report.summary.render());
    for warning in &report.warnings {
        println!("warning: {warning}");
    }
    match &report.distribution {
        DistributionOutcome::NotAttempted => {}
        DistributionOutcome::Published { report } => {
            if report.committed {
                println!("Published release {}.", report.short_version);
            } else {
                println!(
                    "Release {} recorded; distribution repository unchanged.",
                    report.short_version
                );
            }
            if !report.pruned.is_empty() {
                println!("Removed superseded releases: {}", report.pruned.join(", "));
            }
        }
        DistributionOutcome::Failed { reason } => {
            println!("Local builds, installs and pushes succeeded.");
            println!("Distribution failed: {reason}");
        }
    }
}

async fn cmd_plan(config: &FleetConfig, args: &BuildArgs) -> Result<()> {
    let plan = orchestrator(config)?.plan(args.plan_options()?).await;
    print!("{}", render_plan(&plan));
    Ok(())
}

fn render_plan(plan: &BuildPlan) -> String {
    if plan.is_noop() {
        return "Nothing to build.\n".to_string();
    }
    let width = plan
        .tasks
        .iter()
        .map(|t| t.service.id.len())
        .max()
        .unwrap_or(0);
    let mut out = format!("{} release, {} service(s):\n", plan.release_type, plan.tasks.len());
    for task in &plan.tasks {
        out.push_str(&format!(
            "  {:<width$}  {} -> {}\n",
            task.service.id, task.current, task.target
        ));
    }
    out
}

async fn cmd_versions(config: &FleetConfig) -> Result<()> {
    let survey = orchestrator(config)?.survey().await;
    let width = survey
        .iter()
        .map(|(s, _)| s.definition.id.len())
        .max()
        .unwrap_or(0);
    for (state, resolved) in survey {
        let show = |v: Option<fleet_core::VersionCore>| {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        };
        println!(
            "{:<width$}  {}  manifest {}  tag {}  binary {}{}",
            state.definition.id,
            resolved.resolved,
            show(resolved.manifest),
            show(resolved.tag),
            show(resolved.binary),
            if state.has_changes { "  (changed)" } else { "" },
        );
    }
    Ok(())
}
