//! Network seams: creating resources and invoking them
//!
//! Both operations block until the network confirms inclusion and never retry.

pub mod contracts;
pub mod rpc;
pub mod simulated;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, TxHash};
use async_trait::async_trait;
use serde::Serialize;

use crate::domain::ResourceName;
use crate::environment::TxParams;
use crate::error::Result;

pub use contracts::ContractCall;
pub use rpc::RpcChain;
pub use simulated::SimulatedChain;

/// How a resource's creation code is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployMode {
    /// Bytecode plus type-checked constructor arguments
    Structured,
    /// Bytecode alone; the address is read from the confirmed receipt
    Raw,
}

/// A fully resolved resource-creation request
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub resource: ResourceName,
    pub artifact: String,
    pub mode: DeployMode,
    /// Creation code, constructor arguments already appended in structured mode
    pub code: Bytes,
    /// Resolved constructor arguments, empty in raw mode
    pub args: Vec<DynSolValue>,
    pub params: TxParams,
}

/// Confirmed creation transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedDeployment {
    pub address: Address,
    pub receipt: TxReceipt,
}

/// Confirmation details of an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// A fully resolved call against an already-deployed resource
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: ResourceName,
    pub address: Address,
    pub call: ContractCall,
    pub params: TxParams,
}

#[async_trait]
pub trait ResourceDeployer: Send + Sync {
    /// Submit one creation transaction and wait for its confirmation.
    ///
    /// Rejections fail with `DeploymentFailed`.
    async fn deploy(&self, request: &DeployRequest) -> Result<ConfirmedDeployment>;
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Submit one call and wait for its confirmation.
    ///
    /// Rejections by the target fail with `InvocationFailed`.
    async fn invoke(&self, invocation: &Invocation) -> Result<TxReceipt>;
}
