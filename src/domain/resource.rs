use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical resources of the protocol topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceName {
    /// Stable-value token backing the organization reserve
    StableToken,
    Exchange,
    /// Content-registry token used by the voting module
    ContentToken,
    /// Quadratic-voting weighting helper (raw bytecode)
    WeightingHelper,
    Voting,
    GovernanceToken,
    /// Bonding-curve square-root helper (raw bytecode)
    BondingHelper,
    BondingMath,
    Organization,
}

impl ResourceName {
    pub const ALL: [ResourceName; 9] = [
        ResourceName::StableToken,
        ResourceName::Exchange,
        ResourceName::ContentToken,
        ResourceName::WeightingHelper,
        ResourceName::Voting,
        ResourceName::GovernanceToken,
        ResourceName::BondingHelper,
        ResourceName::BondingMath,
        ResourceName::Organization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceName::StableToken => "stable_token",
            ResourceName::Exchange => "exchange",
            ResourceName::ContentToken => "content_token",
            ResourceName::WeightingHelper => "weighting_helper",
            ResourceName::Voting => "voting",
            ResourceName::GovernanceToken => "governance_token",
            ResourceName::BondingHelper => "bonding_helper",
            ResourceName::BondingMath => "bonding_math",
            ResourceName::Organization => "organization",
        }
    }

    /// Name of the compiled artifact file (without `.json`) for this resource
    pub fn artifact(&self) -> &'static str {
        match self {
            ResourceName::StableToken => "MogulDAI",
            ResourceName::Exchange => "DAIExchange",
            ResourceName::ContentToken => "MovieToken",
            ResourceName::WeightingHelper => "TokensSQRT",
            ResourceName::Voting => "Voting",
            ResourceName::GovernanceToken => "MogulToken",
            ResourceName::BondingHelper => "SQRT",
            ResourceName::BondingMath => "BondingMathematics",
            ResourceName::Organization => "MogulOrganisation",
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ResourceName {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let normalized = s.trim().to_ascii_lowercase();
        ResourceName::ALL
            .into_iter()
            .find(|name| name.as_str() == normalized)
            .ok_or_else(|| format!("Unknown resource: {}", s))
    }
}

/// How a resource came to exist in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceOrigin {
    /// Created by this run
    Deployed,
    /// Pre-existing shared infrastructure referenced by address
    Referenced,
}

/// Address of a resource produced during a provisioning run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub name: ResourceName,
    pub address: Address,
    /// Index of the plan step that created or referenced the resource
    pub step: usize,
    pub origin: ResourceOrigin,
    /// Creation transaction, absent for referenced resources
    pub tx_hash: Option<TxHash>,
    pub recorded_at: DateTime<Utc>,
}

impl ResourceHandle {
    pub fn deployed(name: ResourceName, address: Address, step: usize, tx_hash: TxHash) -> Self {
        Self {
            name,
            address,
            step,
            origin: ResourceOrigin::Deployed,
            tx_hash: Some(tx_hash),
            recorded_at: Utc::now(),
        }
    }

    pub fn referenced(name: ResourceName, address: Address, step: usize) -> Self {
        Self {
            name,
            address,
            step,
            origin: ResourceOrigin::Referenced,
            tx_hash: None,
            recorded_at: Utc::now(),
        }
    }
}
