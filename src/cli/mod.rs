//! orgdeploy CLI
//!
//! Commands:
//! - `orgdeploy plan` - Show the provisioning plan for an environment
//! - `orgdeploy deploy` - Provision the protocol onto an environment

pub mod output;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::ArtifactSet;
use crate::chain::{ResourceDeployer, RpcChain, SimulatedChain, TransactionSubmitter};
use crate::config::AppConfig;
use crate::environment::{parse_environment_kind, EnvironmentKind, EnvironmentResolver};
use crate::error::DeployError;
use crate::plan::{ProvisioningPlan, UNLOCK_AMOUNT};
use crate::provisioner::{ProvisioningReport, Provisioner};
use crate::signing::wallet::SECRET_ENV_VARS;
use crate::signing::OperatorWallet;
use output::{OutputMode, PlanRow, ResourceRow};

/// Protocol deployment orchestrator
#[derive(Parser, Debug)]
#[command(name = "orgdeploy")]
#[command(author, version, about = "Provision the organization protocol onto a network")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration directory
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: PathBuf,

    /// Print command output as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate and print the provisioning plan
    Plan {
        /// Target environment (ephemeral, persistent)
        #[arg(short, long, value_parser = parse_environment_kind)]
        env: EnvironmentKind,
    },

    /// Run the provisioning plan
    Deploy(DeployArgs),
}

#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Target environment (ephemeral, persistent)
    #[arg(short, long, value_parser = parse_environment_kind)]
    pub env: EnvironmentKind,

    /// Execute against an in-memory chain instead of the network
    #[arg(long)]
    pub dry_run: bool,

    /// Write the run report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Operator identity from the environment; `allow_ephemeral` falls back to a
/// throwaway key when no secret is configured.
fn operator_wallet(allow_ephemeral: bool) -> anyhow::Result<OperatorWallet> {
    let configured = SECRET_ENV_VARS
        .iter()
        .any(|var| std::env::var(var).map_or(false, |v| !v.trim().is_empty()));

    match OperatorWallet::from_env() {
        Ok(wallet) => Ok(wallet),
        Err(e) if allow_ephemeral && !configured => {
            let wallet = OperatorWallet::random();
            warn!("{}; using throwaway operator {}", e, wallet.address());
            Ok(wallet)
        }
        Err(e) => Err(e).context("operator key is required to deploy"),
    }
}

pub async fn run_plan(
    config: &AppConfig,
    kind: EnvironmentKind,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let wallet = operator_wallet(true)?;
    let env = EnvironmentResolver::new(config.clone()).resolve(kind, &wallet)?;
    let plan = ProvisioningPlan::for_environment(&env);
    plan.validate()?;

    let rows: Vec<PlanRow> = plan
        .steps()
        .iter()
        .enumerate()
        .map(|(index, step)| PlanRow::from_step(index, step))
        .collect();
    output::print_items(&rows, mode)
}

pub async fn run_deploy(
    config: &AppConfig,
    args: &DeployArgs,
    mode: OutputMode,
) -> anyhow::Result<()> {
    let wallet = operator_wallet(args.dry_run)?;
    let env = EnvironmentResolver::new(config.clone()).resolve(args.env, &wallet)?;
    let artifacts = ArtifactSet::load_dir(&config.artifacts.dir)?;
    let plan = ProvisioningPlan::for_environment(&env);

    let (deployer, submitter): (Arc<dyn ResourceDeployer>, Arc<dyn TransactionSubmitter>) =
        if args.dry_run {
            let chain = Arc::new(SimulatedChain::new(wallet.address()));
            if let Some(stable_token) = env.known.stable_token {
                // Shared token as found on the network: the operator holds the unlock amount
                chain
                    .install_token(stable_token, wallet.address(), UNLOCK_AMOUNT)
                    .await;
            }
            info!("Dry run: executing against the simulated chain");
            let deployer: Arc<dyn ResourceDeployer> = chain.clone();
            let submitter: Arc<dyn TransactionSubmitter> = chain;
            (deployer, submitter)
        } else {
            let chain = Arc::new(RpcChain::connect(&env, &wallet));
            let deployer: Arc<dyn ResourceDeployer> = chain.clone();
            let submitter: Arc<dyn TransactionSubmitter> = chain;
            (deployer, submitter)
        };

    let mut provisioner = Provisioner::new(env, artifacts, deployer, submitter);
    match provisioner.run(&plan).await {
        Ok(report) => {
            if let Some(path) = &args.report {
                write_report(path, &report)?;
            }
            output::print_report(&report, mode)?;
            if mode == OutputMode::Table {
                output::print_success("Provisioning complete");
            }
            Ok(())
        }
        Err(e) => Err(report_failure(e, provisioner.report(), args.report.as_deref(), mode)),
    }
}

/// Persist and print what an aborted run left behind. The run's own error is
/// always the one returned.
fn report_failure(
    e: DeployError,
    report: ProvisioningReport,
    path: Option<&Path>,
    mode: OutputMode,
) -> anyhow::Error {
    if let Some(path) = path {
        if let Err(write_err) = write_report(path, &report.with_failure(&e)) {
            warn!("Failure report not written: {:#}", write_err);
        }
    }
    if let DeployError::PartialRunAbort { created, .. } = &e {
        if !created.is_empty() {
            output::print_error("Resources created before the failure:");
            let rows: Vec<ResourceRow> = created.iter().map(ResourceRow::from).collect();
            if let Err(print_err) = output::print_items(&rows, mode) {
                warn!("Cannot print created resources: {:#}", print_err);
            }
        }
    }
    e.into()
}

fn write_report(path: &Path, report: &ProvisioningReport) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write report to {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}
