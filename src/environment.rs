//! Environment resolution
//!
//! Turns an environment kind plus the operator identity into a single immutable
//! descriptor. Everything that differs between a throwaway development network and
//! a long-lived shared network is decided here and nowhere else.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::{AppConfig, NetworkConfig};
use crate::error::{DeployError, Result};
use crate::signing::OperatorWallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    /// Throwaway network; every dependency is deployed fresh
    Ephemeral,
    /// Long-lived network; shared infrastructure is referenced by address
    Persistent,
}

impl EnvironmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ephemeral => "ephemeral",
            Self::Persistent => "persistent",
        }
    }
}

impl std::fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EnvironmentKind {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ephemeral" | "local" | "dev" => Ok(Self::Ephemeral),
            "persistent" | "test" | "testnet" => Ok(Self::Persistent),
            _ => Err("invalid environment; expected ephemeral|persistent"),
        }
    }
}

pub fn parse_environment_kind(raw: &str) -> Result<EnvironmentKind> {
    EnvironmentKind::from_str(raw).map_err(|e| DeployError::Validation(e.to_string()))
}

/// Transaction parameters applied to every submission of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub gas_limit: u64,
    pub gas_price_wei: u128,
    pub confirmation_timeout: Duration,
}

impl TxParams {
    fn from_network(network: &NetworkConfig) -> Self {
        Self {
            gas_limit: network.gas_limit,
            gas_price_wei: u128::from(network.gas_price_wei),
            confirmation_timeout: Duration::from_secs(network.confirmation_timeout_secs),
        }
    }
}

/// Accounts and shared infrastructure the organization is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KnownAddresses {
    pub treasury: Address,
    pub whitelister: Address,
    /// Existing stable-value token; `None` means deploy a fresh one
    pub stable_token: Option<Address>,
}

/// Where a dependency comes from in a given environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencySource {
    Deploy,
    Existing(Address),
}

/// Immutable description of the target network for one provisioning run
#[derive(Debug, Clone)]
pub struct EnvironmentDescriptor {
    pub kind: EnvironmentKind,
    pub endpoint: Url,
    pub operator: Address,
    pub tx_defaults: TxParams,
    pub known: KnownAddresses,
}

impl EnvironmentDescriptor {
    pub fn stable_token_source(&self) -> DependencySource {
        match self.known.stable_token {
            Some(address) => DependencySource::Existing(address),
            None => DependencySource::Deploy,
        }
    }
}

/// Builds environment descriptors from configuration
#[derive(Debug, Clone)]
pub struct EnvironmentResolver {
    config: AppConfig,
}

impl EnvironmentResolver {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Resolve `kind` for the given operator.
    ///
    /// Ephemeral environments never reference existing infrastructure: the
    /// stable-value token is deployed fresh and the operator acts as whitelister.
    /// Persistent environments take treasury, whitelister and stable-value token
    /// verbatim from configuration.
    pub fn resolve(
        &self,
        kind: EnvironmentKind,
        operator: &OperatorWallet,
    ) -> Result<EnvironmentDescriptor> {
        self.config.validate(kind).map_err(|errors| {
            DeployError::Validation(format!("{} configuration: {}", kind, errors.join("; ")))
        })?;

        let network = self.config.network(kind);
        let endpoint = Url::parse(&network.rpc_url)
            .map_err(|e| DeployError::Validation(format!("invalid rpc_url: {}", e)))?;
        let operator = operator.address();

        let known = match kind {
            EnvironmentKind::Ephemeral => KnownAddresses {
                treasury: optional_address("ephemeral.treasury", &network.treasury)?
                    .unwrap_or(operator),
                whitelister: operator,
                stable_token: None,
            },
            EnvironmentKind::Persistent => KnownAddresses {
                treasury: required_address("persistent.treasury", &network.treasury)?,
                whitelister: required_address("persistent.whitelister", &network.whitelister)?,
                stable_token: Some(required_address(
                    "persistent.stable_token",
                    &network.stable_token,
                )?),
            },
        };

        let descriptor = EnvironmentDescriptor {
            kind,
            endpoint,
            operator,
            tx_defaults: TxParams::from_network(network),
            known,
        };

        info!(
            "Resolved {} environment: endpoint={}, operator={}, stable_token={:?}",
            descriptor.kind, descriptor.endpoint, descriptor.operator, descriptor.known.stable_token
        );
        Ok(descriptor)
    }
}

fn optional_address(field: &str, value: &Option<String>) -> Result<Option<Address>> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<Address>()
            .map(Some)
            .map_err(|e| DeployError::AddressParsing(format!("{}: {}", field, e))),
        None => Ok(None),
    }
}

fn required_address(field: &str, value: &Option<String>) -> Result<Address> {
    optional_address(field, value)?
        .ok_or_else(|| DeployError::Validation(format!("{} must be set", field)))
}
