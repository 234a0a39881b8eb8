//! # loadcheck CLI
//!
//! ```bash
//! # Storefront load test
//! loadcheck web --base-url https://staging.example.com
//!
//! # Identity service load test, reproducible
//! loadcheck --config config/loadcheck.toml auth --api-key $KEY --seed 42
//!
//! # Rebuild a report from a saved snapshot
//! loadcheck render --pipeline auth --summary reports/firebase-summary.json --out /tmp/reports
//! ```
//!
//! Exit status: 0 when every threshold passed, 1 when any failed, 2 on
//! configuration or I/O errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use loadcheck::{LoadCheckConfig, Pipeline, RunOutcome};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "loadcheck")]
#[command(author = "Flutter E-commerce QA")]
#[command(version)]
#[command(about = "Load tests for the Flutter e-commerce web front and auth backend", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the storefront browsing pipeline
    Web {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Run the identity service pipeline
    Auth {
        #[command(flatten)]
        run: RunArgs,

        /// Identity service API key
        #[arg(long, env = "LOADCHECK_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// Re-render a report from a saved JSON snapshot
    Render {
        /// Pipeline whose report layout to use (web or auth)
        #[arg(short, long)]
        pipeline: Pipeline,

        /// Saved `<name>-summary.json`
        #[arg(short, long)]
        summary: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "reports")]
        out: PathBuf,
    },
}

/// Overrides shared by the run subcommands
#[derive(Args)]
struct RunArgs {
    /// Target base URL
    #[arg(short, long)]
    base_url: Option<String>,

    /// Report output directory
    #[arg(short, long)]
    report_dir: Option<PathBuf>,

    /// Seed for reproducible input selection
    #[arg(long)]
    seed: Option<u64>,

    /// Multiplier applied to think-time pauses
    #[arg(long)]
    think_time_scale: Option<f64>,
}

impl RunArgs {
    fn apply(self, config: &mut LoadCheckConfig, pipeline: Pipeline) {
        if let Some(base_url) = self.base_url {
            match pipeline {
                Pipeline::Web => config.web.base_url = base_url,
                Pipeline::Auth => config.auth.base_url = base_url,
            }
        }
        if let Some(dir) = self.report_dir {
            config.report.dir = dir;
        }
        if self.seed.is_some() {
            config.runtime.seed = self.seed;
        }
        if let Some(scale) = self.think_time_scale {
            config.runtime.think_time_scale = scale;
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (plain, json) = if json {
        (None, Some(fmt::layer().json().with_current_span(false)))
    } else {
        (Some(fmt::layer().with_target(true).with_thread_ids(false)), None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(plain)
        .with(json)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LoadCheckConfig> {
    match path {
        Some(path) => LoadCheckConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(LoadCheckConfig::default()),
    }
}

fn report(outcome: &RunOutcome, title: &str) -> ExitCode {
    outcome.snapshot.print_report(title);
    info!(
        html = %outcome.artifacts.html.display(),
        json = %outcome.artifacts.json.display(),
        "Artifacts written"
    );

    if outcome.passed() {
        info!("All thresholds passed");
        ExitCode::SUCCESS
    } else {
        for name in outcome.snapshot.failed_thresholds() {
            warn!(threshold = name, "Threshold failed");
        }
        ExitCode::from(1)
    }
}

async fn try_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = load_config(cli.config.as_ref())?;

    let (pipeline, title) = match cli.command {
        Commands::Web { run } => {
            run.apply(&mut config, Pipeline::Web);
            (Pipeline::Web, "WEB PERFORMANCE TEST RESULTS")
        }
        Commands::Auth { run, api_key } => {
            run.apply(&mut config, Pipeline::Auth);
            if api_key.is_some() {
                config.auth.api_key = api_key;
            }
            (Pipeline::Auth, "FIREBASE AUTH TEST RESULTS")
        }
        Commands::Render {
            pipeline,
            summary,
            out,
        } => {
            let outcome = loadcheck::render_saved(pipeline, &summary, &out)
                .with_context(|| format!("Failed to render {}", summary.display()))?;
            return Ok(report(&outcome, "SAVED RUN SUMMARY"));
        }
    };

    info!(%pipeline, "loadcheck v{}", env!("CARGO_PKG_VERSION"));
    let outcome = loadcheck::run(pipeline, &config)
        .await
        .with_context(|| format!("{} pipeline failed", pipeline))?;

    Ok(report(&outcome, title))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match try_main(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
