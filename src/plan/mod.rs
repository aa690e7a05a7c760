//! The provisioning plan
//!
//! Steps are pure data. The plan for the protocol topology is fixed; the only input
//! is the environment descriptor, which decides whether the stable-value token is
//! deployed or referenced.

pub mod constants;

use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::chain::DeployMode;
use crate::domain::ResourceName;
use crate::environment::{DependencySource, EnvironmentDescriptor};
use crate::error::PlanError;

pub use constants::{CONTENT_CATALOG, INITIAL_GOVERNANCE_SUPPLY, ONE_TOKEN, UNLOCK_AMOUNT};

/// Where an argument value comes from when a step executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgSource {
    /// Address of a resource produced by an earlier step
    Resource(ResourceName),
    /// The operator's own account
    Operator,
    Treasury,
    Whitelister,
    /// The fixed list of content identifiers
    ContentCatalog,
}

impl ArgSource {
    fn resource(&self) -> Option<ResourceName> {
        match self {
            ArgSource::Resource(name) => Some(*name),
            _ => None,
        }
    }
}

impl fmt::Display for ArgSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgSource::Resource(name) => write!(f, "{}", name),
            ArgSource::Operator => write!(f, "operator"),
            ArgSource::Treasury => write!(f, "treasury"),
            ArgSource::Whitelister => write!(f, "whitelister"),
            ArgSource::ContentCatalog => write!(f, "content_catalog"),
        }
    }
}

/// Linking action against a deployed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Mint { to: ArgSource, amount: U256 },
    GrantMinter { grantee: ArgSource },
    /// The operator gives up its own minter role
    RenounceMinter,
    Approve { spender: ArgSource, amount: U256 },
    /// Terminal activation of the organization
    Activate { unlock_amount: U256, initial_supply: U256 },
}

impl Action {
    fn reads(&self) -> Option<ResourceName> {
        match self {
            Action::Mint { to, .. } => to.resource(),
            Action::GrantMinter { grantee } => grantee.resource(),
            Action::Approve { spender, .. } => spender.resource(),
            Action::RenounceMinter | Action::Activate { .. } => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Mint { to, amount } => write!(f, "mint {} to {}", amount, to),
            Action::GrantMinter { grantee } => write!(f, "grant minter to {}", grantee),
            Action::RenounceMinter => write!(f, "renounce operator minter"),
            Action::Approve { spender, amount } => write!(f, "approve {} for {}", spender, amount),
            Action::Activate {
                unlock_amount,
                initial_supply,
            } => write!(f, "activate (unlock {}, supply {})", unlock_amount, initial_supply),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ProvisioningStep {
    /// Create a resource from its artifact
    Deploy {
        name: ResourceName,
        mode: DeployMode,
        args: Vec<ArgSource>,
    },
    /// Register shared infrastructure that already exists at a known address
    Reference { name: ResourceName, address: Address },
    /// Call an already-registered resource
    Invoke { target: ResourceName, action: Action },
}

impl ProvisioningStep {
    pub fn deploy(name: ResourceName, args: Vec<ArgSource>) -> Self {
        Self::Deploy {
            name,
            mode: DeployMode::Structured,
            args,
        }
    }

    pub fn deploy_raw(name: ResourceName) -> Self {
        Self::Deploy {
            name,
            mode: DeployMode::Raw,
            args: Vec::new(),
        }
    }

    pub fn invoke(target: ResourceName, action: Action) -> Self {
        Self::Invoke { target, action }
    }

    /// Resource this step registers, if any
    pub fn writes(&self) -> Option<ResourceName> {
        match self {
            Self::Deploy { name, .. } | Self::Reference { name, .. } => Some(*name),
            Self::Invoke { .. } => None,
        }
    }

    /// Resources this step needs from earlier steps
    pub fn reads(&self) -> Vec<ResourceName> {
        match self {
            Self::Deploy { args, .. } => args.iter().filter_map(ArgSource::resource).collect(),
            Self::Reference { .. } => Vec::new(),
            Self::Invoke { target, action } => {
                std::iter::once(*target).chain(action.reads()).collect()
            }
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::Deploy {
                name,
                mode: DeployMode::Raw,
                ..
            } => format!("deploy {} (raw)", name),
            Self::Deploy { name, .. } => format!("deploy {}", name),
            Self::Reference { name, address } => format!("reference {} at {}", name, address),
            Self::Invoke { target, action } => format!("{}: {}", target, action),
        }
    }
}

/// Ordered sequence of provisioning steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisioningPlan {
    steps: Vec<ProvisioningStep>,
}

impl ProvisioningPlan {
    pub fn from_steps(steps: Vec<ProvisioningStep>) -> Self {
        Self { steps }
    }

    /// The protocol's fixed plan for `env`
    pub fn for_environment(env: &EnvironmentDescriptor) -> Self {
        use ArgSource::*;
        use ResourceName::*;

        let mut steps = Vec::with_capacity(16);

        // Stable-value token: shared infrastructure or a fresh token funded for the unlock
        match env.stable_token_source() {
            DependencySource::Existing(address) => steps.push(ProvisioningStep::Reference {
                name: StableToken,
                address,
            }),
            DependencySource::Deploy => {
                steps.push(ProvisioningStep::deploy(StableToken, vec![]));
                steps.push(ProvisioningStep::invoke(
                    StableToken,
                    Action::Mint {
                        to: Operator,
                        amount: UNLOCK_AMOUNT,
                    },
                ));
            }
        }

        // Exchange mints stable-value tokens
        steps.push(ProvisioningStep::deploy(Exchange, vec![Resource(StableToken)]));
        steps.push(ProvisioningStep::invoke(
            StableToken,
            Action::GrantMinter {
                grantee: Resource(Exchange),
            },
        ));

        steps.push(ProvisioningStep::deploy(ContentToken, vec![]));

        // Voting
        steps.push(ProvisioningStep::deploy_raw(WeightingHelper));
        steps.push(ProvisioningStep::deploy(
            Voting,
            vec![
                Resource(ContentToken),
                ContentCatalog,
                Resource(WeightingHelper),
            ],
        ));

        steps.push(ProvisioningStep::deploy(GovernanceToken, vec![]));

        // Organization
        steps.push(ProvisioningStep::deploy_raw(BondingHelper));
        steps.push(ProvisioningStep::deploy(
            BondingMath,
            vec![Resource(BondingHelper)],
        ));
        steps.push(ProvisioningStep::deploy(
            Organization,
            vec![
                Resource(BondingMath),
                Resource(StableToken),
                Resource(GovernanceToken),
                Resource(ContentToken),
                Treasury,
                Whitelister,
            ],
        ));

        // Permission handoff; the renounce must stay after the governance grant
        steps.push(ProvisioningStep::invoke(
            ContentToken,
            Action::GrantMinter {
                grantee: Resource(Organization),
            },
        ));
        steps.push(ProvisioningStep::invoke(
            GovernanceToken,
            Action::GrantMinter {
                grantee: Resource(Organization),
            },
        ));
        steps.push(ProvisioningStep::invoke(
            GovernanceToken,
            Action::RenounceMinter,
        ));
        steps.push(ProvisioningStep::invoke(
            StableToken,
            Action::Approve {
                spender: Resource(Organization),
                amount: UNLOCK_AMOUNT,
            },
        ));

        steps.push(ProvisioningStep::invoke(
            Organization,
            Action::Activate {
                unlock_amount: UNLOCK_AMOUNT,
                initial_supply: INITIAL_GOVERNANCE_SUPPLY,
            },
        ));

        Self { steps }
    }

    pub fn steps(&self) -> &[ProvisioningStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the first step matching `predicate`
    pub fn position(&self, predicate: impl Fn(&ProvisioningStep) -> bool) -> Option<usize> {
        self.steps.iter().position(predicate)
    }

    /// Static checks, performed before anything is submitted:
    /// - every read names a resource written by a strictly earlier step
    /// - every resource is written at most once
    /// - a renounce on a token comes after a grant of that role to someone other
    ///   than the operator, so the role is never left without a holder
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut written: HashMap<ResourceName, usize> = HashMap::new();
        let mut granted: HashMap<ResourceName, usize> = HashMap::new();

        for (index, step) in self.steps.iter().enumerate() {
            for name in step.reads() {
                if !written.contains_key(&name) {
                    return Err(PlanError::UndefinedReference {
                        step: index,
                        name: name.to_string(),
                    });
                }
            }

            if let Some(name) = step.writes() {
                if let Some(first) = written.get(&name) {
                    return Err(PlanError::DuplicateResource {
                        step: index,
                        name: name.to_string(),
                        first: *first,
                    });
                }
                written.insert(name, index);
            }

            match step {
                ProvisioningStep::Invoke {
                    target,
                    action: Action::GrantMinter { grantee },
                } if *grantee != ArgSource::Operator => {
                    granted.entry(*target).or_insert(index);
                }
                ProvisioningStep::Invoke {
                    target,
                    action: Action::RenounceMinter,
                } if !granted.contains_key(target) => {
                    return Err(PlanError::RenounceBeforeGrant {
                        step: index,
                        target: target.to_string(),
                    });
                }
                _ => {}
            }
        }

        Ok(())
    }
}
