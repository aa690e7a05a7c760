//! Sequential execution of a provisioning plan
//!
//! Every step is submitted only after the previous one is confirmed. The first
//! failure aborts the run; nothing is retried or rolled back, and the error carries
//! the failed step and every resource created before it.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

use crate::artifacts::ArtifactSet;
use crate::chain::{
    ContractCall, DeployMode, DeployRequest, Invocation, ResourceDeployer, TransactionSubmitter,
    TxReceipt,
};
use crate::domain::{
    OrganizationState, OrganizationTracker, ResourceHandle, ResourceName, ResourceRegistry,
};
use crate::environment::{EnvironmentDescriptor, EnvironmentKind};
use crate::error::{DeployError, Result};
use crate::plan::{Action, ArgSource, ProvisioningPlan, ProvisioningStep, CONTENT_CATALOG};

/// Outcome of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub label: String,
    /// Absent for steps that submit nothing (references)
    pub tx_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

impl StepRecord {
    fn confirmed(index: usize, label: String, receipt: &TxReceipt) -> Self {
        Self {
            index,
            label,
            tx_hash: Some(receipt.tx_hash),
            block_number: receipt.block_number,
            gas_used: Some(receipt.gas_used),
        }
    }

    fn offline(index: usize, label: String) -> Self {
        Self {
            index,
            label,
            tx_hash: None,
            block_number: None,
            gas_used: None,
        }
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    /// Absent when the plan was rejected before any step ran
    pub failed_step: Option<usize>,
    pub label: Option<String>,
    pub reason: String,
}

impl From<&DeployError> for RunFailure {
    fn from(err: &DeployError) -> Self {
        match err {
            DeployError::PartialRunAbort {
                step,
                label,
                source,
                ..
            } => Self {
                failed_step: Some(*step),
                label: Some(label.clone()),
                reason: source.root().to_string(),
            },
            other => Self {
                failed_step: None,
                label: None,
                reason: other.to_string(),
            },
        }
    }
}

/// Summary of a run, complete or aborted
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningReport {
    pub environment: EnvironmentKind,
    pub endpoint: String,
    pub operator: Address,
    /// Every resource handle in deployment order
    pub resources: Vec<ResourceHandle>,
    pub steps: Vec<StepRecord>,
    pub organization_state: Option<OrganizationState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    pub finished_at: DateTime<Utc>,
}

impl ProvisioningReport {
    /// Attach the error that stopped the run
    pub fn with_failure(mut self, err: &DeployError) -> Self {
        self.failure = Some(RunFailure::from(err));
        self
    }

    pub fn address_of(&self, name: ResourceName) -> Option<Address> {
        self.resources
            .iter()
            .find(|handle| handle.name == name)
            .map(|handle| handle.address)
    }

    pub fn total_gas_used(&self) -> u64 {
        self.steps.iter().filter_map(|step| step.gas_used).sum()
    }
}

/// Drives one provisioning run against a chain.
///
/// A provisioner owns the registry of a single run; build a new one per run.
pub struct Provisioner {
    env: EnvironmentDescriptor,
    artifacts: ArtifactSet,
    deployer: Arc<dyn ResourceDeployer>,
    submitter: Arc<dyn TransactionSubmitter>,
    registry: ResourceRegistry,
    organization: OrganizationTracker,
    records: Vec<StepRecord>,
}

impl Provisioner {
    pub fn new(
        env: EnvironmentDescriptor,
        artifacts: ArtifactSet,
        deployer: Arc<dyn ResourceDeployer>,
        submitter: Arc<dyn TransactionSubmitter>,
    ) -> Self {
        Self {
            env,
            artifacts,
            deployer,
            submitter,
            registry: ResourceRegistry::new(),
            organization: OrganizationTracker::new(),
            records: Vec::new(),
        }
    }

    pub fn environment(&self) -> &EnvironmentDescriptor {
        &self.env
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn organization_state(&self) -> Option<OrganizationState> {
        self.organization.state()
    }

    /// Validate `plan`, then execute its steps in order.
    ///
    /// A validation failure returns before anything is submitted. A step failure
    /// returns `PartialRunAbort` with the registry snapshot at that point.
    pub async fn run(&mut self, plan: &ProvisioningPlan) -> Result<ProvisioningReport> {
        plan.validate()?;

        info!(
            "Provisioning {} environment: {} steps, operator {}",
            self.env.kind,
            plan.len(),
            self.env.operator
        );
        let started = Instant::now();

        for (index, step) in plan.steps().iter().enumerate() {
            if let Err(e) = self.execute_step(index, step).await {
                let label = step.label();
                error!(
                    "Step {} ({}) failed after {} resource(s) were created: {}",
                    index,
                    label,
                    self.registry.len(),
                    e
                );
                return Err(DeployError::PartialRunAbort {
                    step: index,
                    label,
                    created: self.registry.snapshot(),
                    source: Box::new(e),
                });
            }
        }

        info!(
            "Provisioning complete in {:.1}s: {} resources, organization {}",
            started.elapsed().as_secs_f64(),
            self.registry.len(),
            self.organization
                .state()
                .map(|s| s.as_str())
                .unwrap_or("absent")
        );

        Ok(self.report())
    }

    pub fn report(&self) -> ProvisioningReport {
        ProvisioningReport {
            environment: self.env.kind,
            endpoint: self.env.endpoint.to_string(),
            operator: self.env.operator,
            resources: self.registry.snapshot(),
            steps: self.records.clone(),
            organization_state: self.organization.state(),
            failure: None,
            finished_at: Utc::now(),
        }
    }

    #[instrument(skip(self, step), fields(label = %step.label()))]
    async fn execute_step(&mut self, index: usize, step: &ProvisioningStep) -> Result<()> {
        let label = step.label();
        let record = match step {
            ProvisioningStep::Reference { name, address } => {
                self.registry
                    .insert(ResourceHandle::referenced(*name, *address, index))?;
                info!("[{}] Referenced existing {} at {}", index, name, address);
                StepRecord::offline(index, label)
            }
            ProvisioningStep::Deploy { name, mode, args } => {
                let receipt = self.deploy(index, *name, *mode, args).await?;
                StepRecord::confirmed(index, label, &receipt)
            }
            ProvisioningStep::Invoke { target, action } => {
                let receipt = self.invoke(index, *target, action).await?;
                StepRecord::confirmed(index, label, &receipt)
            }
        };
        self.records.push(record);
        Ok(())
    }

    async fn deploy(
        &mut self,
        index: usize,
        name: ResourceName,
        mode: DeployMode,
        sources: &[ArgSource],
    ) -> Result<TxReceipt> {
        let artifact = self.artifacts.get(name)?;

        let (code, args) = match mode {
            DeployMode::Structured => {
                let args = sources
                    .iter()
                    .map(|source| self.resolve_value(index, source))
                    .collect::<Result<Vec<_>>>()?;
                (artifact.creation_code(&args)?, args)
            }
            DeployMode::Raw => {
                if !sources.is_empty() {
                    return Err(DeployError::InvalidConstructorArgs {
                        artifact: artifact.name.clone(),
                        reason: "raw deployments take no constructor arguments".to_string(),
                    });
                }
                (artifact.raw_code(), Vec::new())
            }
        };

        let request = DeployRequest {
            resource: name,
            artifact: artifact.name.clone(),
            mode,
            code,
            args,
            params: self.env.tx_defaults,
        };
        debug!(
            "Deploying {} ({} bytes of creation code)",
            request.artifact,
            request.code.len()
        );

        let confirmed = self.deployer.deploy(&request).await?;
        self.registry.insert(ResourceHandle::deployed(
            name,
            confirmed.address,
            index,
            confirmed.receipt.tx_hash,
        ))?;
        if name == ResourceName::Organization {
            self.organization.on_deployed();
        }

        info!(
            "[{}] Deployed {} at {} (tx {})",
            index, name, confirmed.address, confirmed.receipt.tx_hash
        );
        Ok(confirmed.receipt)
    }

    async fn invoke(
        &mut self,
        index: usize,
        target: ResourceName,
        action: &Action,
    ) -> Result<TxReceipt> {
        let address = self.registry.address(target, index)?;

        let call = match *action {
            Action::Mint { to, amount } => ContractCall::Mint {
                to: self.resolve_address(index, &to)?,
                amount,
            },
            Action::GrantMinter { grantee } => ContractCall::AddMinter {
                account: self.resolve_address(index, &grantee)?,
            },
            Action::RenounceMinter => ContractCall::RenounceMinter,
            Action::Approve { spender, amount } => ContractCall::Approve {
                spender: self.resolve_address(index, &spender)?,
                amount,
            },
            Action::Activate {
                unlock_amount,
                initial_supply,
            } => {
                if self.organization.is_unlocked() {
                    return Err(DeployError::AlreadyUnlocked {
                        organization: address.to_string(),
                    });
                }
                ContractCall::UnlockOrganisation {
                    unlock_amount,
                    initial_supply,
                }
            }
        };

        let invocation = Invocation {
            target,
            address,
            call,
            params: self.env.tx_defaults,
        };

        let receipt = match self.submitter.invoke(&invocation).await {
            Ok(receipt) => receipt,
            Err(DeployError::InvocationFailed { reason, .. })
                if matches!(action, Action::Activate { .. })
                    && reason.to_ascii_lowercase().contains("already unlocked") =>
            {
                return Err(DeployError::AlreadyUnlocked {
                    organization: address.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        self.observe(target, action);
        info!(
            "[{}] {}.{} confirmed (tx {})",
            index,
            target,
            invocation.call.name(),
            receipt.tx_hash
        );
        Ok(receipt)
    }

    /// Feed a confirmed action into the organization state machine
    fn observe(&mut self, target: ResourceName, action: &Action) {
        let organization = ArgSource::Resource(ResourceName::Organization);
        match action {
            Action::GrantMinter { grantee } if *grantee == organization => {
                self.organization.on_minter_granted(target);
            }
            Action::Approve { spender, .. }
                if *spender == organization && target == ResourceName::StableToken =>
            {
                self.organization.on_approved();
            }
            Action::Activate { .. } => self.organization.on_unlocked(),
            _ => {}
        }
    }

    fn resolve_address(&self, index: usize, source: &ArgSource) -> Result<Address> {
        match source {
            ArgSource::Resource(name) => self.registry.address(*name, index),
            ArgSource::Operator => Ok(self.env.operator),
            ArgSource::Treasury => Ok(self.env.known.treasury),
            ArgSource::Whitelister => Ok(self.env.known.whitelister),
            ArgSource::ContentCatalog => Err(DeployError::Validation(format!(
                "step {} uses the content catalog where an address is required",
                index
            ))),
        }
    }

    fn resolve_value(&self, index: usize, source: &ArgSource) -> Result<DynSolValue> {
        match source {
            ArgSource::ContentCatalog => Ok(DynSolValue::Array(
                CONTENT_CATALOG
                    .iter()
                    .map(|id| DynSolValue::FixedBytes(*id, 32))
                    .collect(),
            )),
            other => self.resolve_address(index, other).map(DynSolValue::Address),
        }
    }
}
