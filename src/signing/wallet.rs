use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::info;
use zeroize::Zeroize;

use crate::error::{DeployError, Result};

/// Environment variables consulted for the operator secret, in order
pub const SECRET_ENV_VARS: [&str; 2] = ["ORGDEPLOY_PRIVATE_KEY", "PRIVATE_KEY"];

/// Transaction-signing identity of the operator running the provisioning plan
///
/// # Security
/// The private key string is zeroized after the signer is built and is never
/// stored alongside it.
#[derive(Clone)]
pub struct OperatorWallet {
    signer: PrivateKeySigner,
}

impl OperatorWallet {
    /// Create a wallet from a private key hex string (with or without `0x`)
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let mut secure_key = private_key.trim().trim_start_matches("0x").to_string();

        let parsed = secure_key
            .parse::<PrivateKeySigner>()
            .map_err(|e| DeployError::Wallet(format!("Invalid private key: {}", e)));

        secure_key.zeroize();
        let signer = parsed?;

        info!("Operator wallet initialized: {}", signer.address());
        Ok(Self { signer })
    }

    /// Create a wallet from `ORGDEPLOY_PRIVATE_KEY` or `PRIVATE_KEY`
    pub fn from_env() -> Result<Self> {
        let mut private_key = SECRET_ENV_VARS
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                DeployError::Wallet(format!(
                    "{} environment variable not set",
                    SECRET_ENV_VARS.join(" or ")
                ))
            })?;

        let result = Self::from_private_key(&private_key);
        private_key.zeroize();
        result
    }

    /// Random throwaway identity, used for dry runs without a configured key
    pub fn random() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Network wallet for the alloy provider stack
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl std::fmt::Debug for OperatorWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorWallet")
            .field("address", &self.address())
            .finish()
    }
}
