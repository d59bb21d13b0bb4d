//! TopoLVM E2E
//!
//! Runs the end-to-end scenario catalog against the cluster `kubectl` points
//! at and exits non-zero if any scenario failed.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use topolvm_e2e::{
    scenario::catalog, Driver, Harness, HarnessConfig, Kubectl, KubernetesVersion, LvmCli,
    Outcome, SuiteReport, TokioClock,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// TopoLVM E2E - verification harness for capacity-aware LVM provisioning
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// kubectl binary
    #[arg(long, env = "KUBECTL", default_value = "kubectl")]
    kubectl: String,

    /// Privilege wrapper for LVM commands (empty to run them directly)
    #[arg(long, env = "SUDO", default_value = "sudo")]
    sudo: String,

    /// Target Kubernetes version, e.g. 1.18
    #[arg(long, env = "TEST_KUBERNETES_VERSION")]
    kubernetes_version: Option<String>,

    /// Default convergence timeout in seconds
    #[arg(long, env = "POLL_TIMEOUT", default_value = "180")]
    poll_timeout_secs: u64,

    /// Poll interval in seconds
    #[arg(long, env = "POLL_INTERVAL", default_value = "1")]
    poll_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run scenarios
    Run {
        /// Only run the named scenarios
        #[arg(long, num_args = 1..)]
        only: Vec<String>,

        /// Run every scenario one after another
        #[arg(long)]
        sequential: bool,

        /// Print the suite report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List available scenarios
    List,
}

impl Args {
    fn harness_config(&self) -> anyhow::Result<HarnessConfig> {
        let mut config = HarnessConfig {
            kubectl: self.kubectl.clone(),
            sudo: self.sudo.clone(),
            ..Default::default()
        };
        config.polling.timeout = Duration::from_secs(self.poll_timeout_secs);
        config.polling.interval = Duration::from_secs(self.poll_interval_secs);
        config.kubernetes_version = self
            .kubernetes_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| v.parse::<KubernetesVersion>())
            .transpose()
            .context("invalid TEST_KUBERNETES_VERSION")?;
        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    match &args.command {
        Command::List => {
            for scenario in catalog::all() {
                let gate = scenario
                    .min_minor_version()
                    .map(|minor| format!(" (>= 1.{})", minor))
                    .unwrap_or_default();
                println!("{:<34}{}{}", scenario.name(), scenario.description(), gate);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            only,
            sequential,
            json,
        } => {
            let config = args.harness_config()?;
            let scenarios = catalog::select(only)?;

            info!("Starting TopoLVM e2e suite");
            info!("  Version: {}", topolvm_e2e::VERSION);
            info!("  kubectl: {}", config.kubectl);
            info!(
                "  Kubernetes: {}",
                config
                    .kubernetes_version
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unset".to_string())
            );
            info!("  Scenarios: {}", scenarios.len());

            let control_plane = Arc::new(Kubectl::new(config.kubectl.clone()));
            let volumes = Arc::new(LvmCli::new(config.sudo.clone()));
            let harness = Harness::new(config, control_plane, volumes, TokioClock::new());

            let suite = Driver::new(harness)
                .sequential(*sequential)
                .run_all(&scenarios)
                .await;

            if *json {
                println!("{}", serde_json::to_string_pretty(&suite)?);
            } else {
                print_summary(&suite);
            }

            if suite.success() {
                Ok(ExitCode::SUCCESS)
            } else {
                error!("{} scenario(s) failed", suite.failed());
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Summary
// =============================================================================

fn print_summary(suite: &SuiteReport) {
    for report in &suite.scenarios {
        let (status, detail) = match &report.outcome {
            Outcome::Passed => ("PASS", String::new()),
            Outcome::Skipped(reason) => ("SKIP", reason.clone()),
            Outcome::Failed(reason) => (
                "FAIL",
                format!(
                    "{} (namespace {} kept)",
                    reason,
                    report.namespace.as_deref().unwrap_or("-")
                ),
            ),
        };
        println!(
            "{} {:<34}{:>8.1}s  {}",
            status,
            report.name,
            report.duration.as_secs_f64(),
            detail
        );
    }
    println!(
        "\n{} passed, {} failed, {} skipped",
        suite.passed(),
        suite.failed(),
        suite.skipped()
    );
}
