use serde::{Deserialize, Serialize};
use std::fmt;

use super::resource::ResourceName;

/// Organization lifecycle as observed by the provisioner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrganizationState {
    /// Created, no privileges yet
    Deployed,
    /// Minter on both the content and governance tokens
    PermissionsGranted,
    /// Activation consumed the allowance; terminal
    Unlocked,
}

impl OrganizationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationState::Deployed => "DEPLOYED",
            OrganizationState::PermissionsGranted => "PERMISSIONS_GRANTED",
            OrganizationState::Unlocked => "UNLOCKED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: OrganizationState) -> bool {
        use OrganizationState::*;

        matches!(
            (self, target),
            (Deployed, PermissionsGranted) | (PermissionsGranted, Unlocked)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrganizationState::Unlocked)
    }
}

impl fmt::Display for OrganizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrganizationState {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "DEPLOYED" => Ok(OrganizationState::Deployed),
            "PERMISSIONS_GRANTED" => Ok(OrganizationState::PermissionsGranted),
            "UNLOCKED" => Ok(OrganizationState::Unlocked),
            _ => Err(format!("Unknown organization state: {}", s)),
        }
    }
}

/// Tracks the confirmations that drive the organization state machine.
///
/// `PermissionsGranted` needs both minter grants confirmed; `Unlocked` needs the
/// stable-token approval confirmed before activation succeeds.
#[derive(Debug, Clone, Default)]
pub struct OrganizationTracker {
    state: Option<OrganizationState>,
    content_minter: bool,
    governance_minter: bool,
    approved: bool,
}

impl OrganizationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<OrganizationState> {
        self.state
    }

    pub fn is_unlocked(&self) -> bool {
        self.state == Some(OrganizationState::Unlocked)
    }

    pub fn is_approved(&self) -> bool {
        self.approved
    }

    pub fn on_deployed(&mut self) {
        self.state = Some(OrganizationState::Deployed);
    }

    /// Record a confirmed minter grant to the organization on `token`
    pub fn on_minter_granted(&mut self, token: ResourceName) {
        match token {
            ResourceName::ContentToken => self.content_minter = true,
            ResourceName::GovernanceToken => self.governance_minter = true,
            _ => {}
        }
        if self.content_minter && self.governance_minter {
            self.advance(OrganizationState::PermissionsGranted);
        }
    }

    pub fn on_approved(&mut self) {
        self.approved = true;
    }

    /// Record a confirmed activation. Without a confirmed approval the
    /// organization stays where it was.
    pub fn on_unlocked(&mut self) {
        if self.approved {
            self.advance(OrganizationState::Unlocked);
        }
    }

    fn advance(&mut self, target: OrganizationState) {
        if let Some(current) = self.state {
            if current.can_transition_to(target) {
                self.state = Some(target);
            }
        }
    }
}
