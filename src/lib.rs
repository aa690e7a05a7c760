pub mod artifacts;
pub mod chain;
pub mod cli;
pub mod config;
pub mod domain;
pub mod environment;
pub mod error;
pub mod plan;
pub mod provisioner;
pub mod signing;

pub use artifacts::{Artifact, ArtifactSet};
pub use chain::{
    ContractCall, DeployMode, ResourceDeployer, RpcChain, SimulatedChain, TransactionSubmitter,
};
pub use config::AppConfig;
pub use domain::{
    OrganizationState, ResourceHandle, ResourceName, ResourceOrigin, ResourceRegistry,
};
pub use environment::{EnvironmentDescriptor, EnvironmentKind, EnvironmentResolver};
pub use error::{DeployError, PlanError, Result};
pub use plan::{Action, ArgSource, ProvisioningPlan, ProvisioningStep};
pub use provisioner::{ProvisioningReport, Provisioner, RunFailure, StepRecord};
pub use signing::OperatorWallet;
