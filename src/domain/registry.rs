//! Per-run resource registry
//!
//! Holds every address produced so far, in deployment order, so later steps can
//! reference earlier ones. A logical name is written at most once per run.

use alloy::primitives::Address;
use indexmap::IndexMap;

use super::resource::{ResourceHandle, ResourceName};
use crate::error::{DeployError, PlanError, Result};

#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    entries: IndexMap<ResourceName, ResourceHandle>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle. Rejects a second write of the same logical name.
    pub fn insert(&mut self, handle: ResourceHandle) -> Result<()> {
        if let Some(existing) = self.entries.get(&handle.name) {
            return Err(DeployError::Plan(PlanError::DuplicateResource {
                step: handle.step,
                name: handle.name.to_string(),
                first: existing.step,
            }));
        }
        self.entries.insert(handle.name, handle);
        Ok(())
    }

    pub fn get(&self, name: ResourceName) -> Option<&ResourceHandle> {
        self.entries.get(&name)
    }

    /// Address of a resource that an earlier step must have produced
    pub fn address(&self, name: ResourceName, reading_step: usize) -> Result<Address> {
        self.entries
            .get(&name)
            .filter(|handle| handle.step < reading_step)
            .map(|handle| handle.address)
            .ok_or_else(|| {
                DeployError::Plan(PlanError::UndefinedReference {
                    step: reading_step,
                    name: name.to_string(),
                })
            })
    }

    pub fn contains(&self, name: ResourceName) -> bool {
        self.entries.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles in insertion (deployment) order
    pub fn iter(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.entries.values()
    }

    pub fn snapshot(&self) -> Vec<ResourceHandle> {
        self.entries.values().cloned().collect()
    }
}
