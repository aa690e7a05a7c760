//! Compiled contract artifacts
//!
//! Artifacts are the JSON build outputs (`{contractName, abi, bytecode}`) of the
//! protocol's contracts. The provisioner treats them as opaque code plus an optional
//! interface description used to check constructor arguments before submission.

use alloy::dyn_abi::{DynSolValue, Specifier};
use alloy::json_abi::JsonAbi;
use alloy::primitives::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::domain::ResourceName;
use crate::error::{DeployError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactFile {
    #[serde(default)]
    contract_name: Option<String>,
    #[serde(default)]
    abi: Option<JsonAbi>,
    bytecode: String,
}

/// A deployable artifact
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub abi: Option<JsonAbi>,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Parse a build JSON document. `fallback_name` is used when the document
    /// carries no `contractName`.
    pub fn from_json(fallback_name: &str, json: &str) -> Result<Self> {
        let file: ArtifactFile = serde_json::from_str(json)
            .map_err(|e| DeployError::Artifact(format!("{}: {}", fallback_name, e)))?;

        let name = file
            .contract_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());

        let code_hex = file
            .bytecode
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X");
        let bytecode = hex::decode(code_hex)
            .map_err(|e| DeployError::Artifact(format!("{}: invalid bytecode: {}", name, e)))?;
        if bytecode.is_empty() {
            return Err(DeployError::Artifact(format!(
                "{}: bytecode is empty (abstract contract or interface?)",
                name
            )));
        }

        Ok(Self {
            name,
            abi: file.abi,
            bytecode: Bytes::from(bytecode),
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let fallback = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("artifact")
            .to_string();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&fallback, &json)
    }

    /// Creation code for a structured deployment: bytecode followed by the
    /// ABI-encoded constructor arguments.
    ///
    /// Arguments are positional and must match the declared constructor in count
    /// and type.
    pub fn creation_code(&self, args: &[DynSolValue]) -> Result<Bytes> {
        let inputs = self
            .abi
            .as_ref()
            .and_then(|abi| abi.constructor.as_ref())
            .map(|ctor| ctor.inputs.as_slice())
            .unwrap_or(&[]);

        if self.abi.is_none() && !args.is_empty() {
            return Err(self.invalid_args("artifact has no ABI to check arguments against"));
        }

        if inputs.len() != args.len() {
            return Err(self.invalid_args(format!(
                "expected {} argument(s), got {}",
                inputs.len(),
                args.len()
            )));
        }

        for (index, (param, value)) in inputs.iter().zip(args).enumerate() {
            let ty = param.resolve().map_err(|e| {
                self.invalid_args(format!("cannot resolve type of argument {}: {}", index, e))
            })?;
            if !ty.matches(value) {
                return Err(self.invalid_args(format!(
                    "argument {} ({}) expects {}, got {:?}",
                    index,
                    param.name,
                    param.ty,
                    value.sol_type_name()
                )));
            }
        }

        let mut code = self.bytecode.to_vec();
        if !args.is_empty() {
            code.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        }
        debug!(
            "Encoded creation code for {} ({} bytes, {} args)",
            self.name,
            code.len(),
            args.len()
        );
        Ok(Bytes::from(code))
    }

    /// Creation code for a raw deployment: the bytecode alone, no interface involved
    pub fn raw_code(&self) -> Bytes {
        self.bytecode.clone()
    }

    fn invalid_args(&self, reason: impl Into<String>) -> DeployError {
        DeployError::InvalidConstructorArgs {
            artifact: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Artifacts for every resource of the protocol topology
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: HashMap<ResourceName, Artifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<dir>/<Artifact>.json` for every resource. Missing files are reported
    /// together.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut set = Self::new();
        let mut missing = Vec::new();

        for name in ResourceName::ALL {
            let path = dir.join(format!("{}.json", name.artifact()));
            if !path.exists() {
                missing.push(path.display().to_string());
                continue;
            }
            set.insert(name, Artifact::load(&path)?);
        }

        if !missing.is_empty() {
            return Err(DeployError::Artifact(format!(
                "missing artifact file(s): {}",
                missing.join(", ")
            )));
        }
        Ok(set)
    }

    pub fn insert(&mut self, name: ResourceName, artifact: Artifact) {
        self.artifacts.insert(name, artifact);
    }

    pub fn get(&self, name: ResourceName) -> Result<&Artifact> {
        self.artifacts
            .get(&name)
            .ok_or_else(|| DeployError::Artifact(format!("no artifact for {}", name)))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
