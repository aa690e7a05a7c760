#![allow(dead_code)]

use alloy::primitives::Address;
use orgdeploy::config::AppConfig;
use orgdeploy::environment::{EnvironmentDescriptor, EnvironmentKind, EnvironmentResolver};
use orgdeploy::plan::UNLOCK_AMOUNT;
use orgdeploy::{ArtifactSet, OperatorWallet, Provisioner, SimulatedChain};
use std::sync::Arc;

pub const SHARED_TREASURY: &str = "0x53E63Ee92e1268919CF4757A9b1d48048C501A50";
pub const SHARED_STABLE_TOKEN: &str = "0xe0B206A30c778f8809c753844210c73D23001a96";
pub const SHARED_WHITELISTER: &str = "0xD9995BAE12FEe327256FFec1e3184d492bD94C31";

pub fn artifacts() -> ArtifactSet {
    ArtifactSet::load_dir(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/artifacts"))
        .expect("fixture artifacts load")
}

pub fn persistent_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.persistent.rpc_url = "https://shared-node.example.org".to_string();
    config.persistent.treasury = Some(SHARED_TREASURY.to_string());
    config.persistent.whitelister = Some(SHARED_WHITELISTER.to_string());
    config.persistent.stable_token = Some(SHARED_STABLE_TOKEN.to_string());
    config
}

pub fn resolve(
    kind: EnvironmentKind,
    config: AppConfig,
    wallet: &OperatorWallet,
) -> EnvironmentDescriptor {
    EnvironmentResolver::new(config)
        .resolve(kind, wallet)
        .expect("environment resolves")
}

/// Simulated chain for the environment's operator. A referenced stable token is
/// installed with the operator holding the unlock amount.
pub async fn chain_for(env: &EnvironmentDescriptor) -> Arc<SimulatedChain> {
    let chain = Arc::new(SimulatedChain::new(env.operator));
    if let Some(stable_token) = env.known.stable_token {
        chain.install_token(stable_token, env.operator, UNLOCK_AMOUNT).await;
    }
    chain
}

pub fn provisioner(env: EnvironmentDescriptor, chain: &Arc<SimulatedChain>) -> Provisioner {
    Provisioner::new(env, artifacts(), chain.clone(), chain.clone())
}

pub fn ephemeral(wallet: &OperatorWallet) -> EnvironmentDescriptor {
    resolve(EnvironmentKind::Ephemeral, AppConfig::default(), wallet)
}

pub fn address(raw: &str) -> Address {
    raw.parse().expect("valid address")
}
