use thiserror::Error;

use crate::domain::ResourceHandle;

/// Main error type for a provisioning run
#[derive(Error, Debug)]
pub enum DeployError {
    // Resource creation errors
    #[error("Invalid constructor arguments for {artifact}: {reason}")]
    InvalidConstructorArgs { artifact: String, reason: String },

    #[error("Deployment of {artifact} failed: {reason}")]
    DeploymentFailed { artifact: String, reason: String },

    // Linking errors
    #[error("Invocation {action} on {target} failed: {reason}")]
    InvocationFailed {
        target: String,
        action: String,
        reason: String,
    },

    #[error("Organization {organization} is already unlocked")]
    AlreadyUnlocked { organization: String },

    /// A step failed after earlier steps were confirmed on-chain.
    #[error("Provisioning aborted at step {step} ({label}) with {} resource(s) already created: {source}", .created.len())]
    PartialRunAbort {
        step: usize,
        label: String,
        created: Vec<ResourceHandle>,
        #[source]
        source: Box<DeployError>,
    },

    // Plan errors
    #[error("Invalid provisioning plan: {0}")]
    Plan(#[from] PlanError),

    // Artifact errors
    #[error("Artifact error: {0}")]
    Artifact(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    Validation(String),

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl DeployError {
    /// Index of the failed step when this error aborted a run
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            DeployError::PartialRunAbort { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Root cause, looking through a `PartialRunAbort` wrapper
    pub fn root(&self) -> &DeployError {
        match self {
            DeployError::PartialRunAbort { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for DeployError
pub type Result<T> = std::result::Result<T, DeployError>;

/// Static defects of a provisioning plan, detected before anything is submitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("step {step} reads '{name}' which no earlier step creates")]
    UndefinedReference { step: usize, name: String },

    #[error("step {step} creates '{name}' which step {first} already created")]
    DuplicateResource {
        step: usize,
        name: String,
        first: usize,
    },

    #[error("step {step} renounces the minter role on '{target}' before any other holder was granted it")]
    RenounceBeforeGrant { step: usize, target: String },
}
