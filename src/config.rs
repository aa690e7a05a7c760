use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::environment::EnvironmentKind;

pub const DEFAULT_GAS_LIMIT: u64 = 4_700_000;
pub const DEFAULT_GAS_PRICE_WEI: u64 = 9_000_000_000;
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 120;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "NetworkConfig::ephemeral_default")]
    pub ephemeral: NetworkConfig,
    #[serde(default)]
    pub persistent: NetworkConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network endpoint, transaction ceilings and well-known addresses for one
/// environment kind
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default = "default_gas_price_wei")]
    pub gas_price_wei: u64,
    /// Seconds to wait for a transaction to be included
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Treasury receiving organization funds (ephemeral: defaults to the operator)
    #[serde(default)]
    pub treasury: Option<String>,
    /// Whitelisting authority (ephemeral: always the operator)
    #[serde(default)]
    pub whitelister: Option<String>,
    /// Shared stable-value token (persistent only)
    #[serde(default)]
    pub stable_token: Option<String>,
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_gas_price_wei() -> u64 {
    DEFAULT_GAS_PRICE_WEI
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT_SECS
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price_wei: DEFAULT_GAS_PRICE_WEI,
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT_SECS,
            treasury: None,
            whitelister: None,
            stable_token: None,
        }
    }
}

impl NetworkConfig {
    /// Local development node on the default port
    pub fn ephemeral_default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Directory holding `<ContractName>.json` build outputs
    #[serde(default = "default_artifacts_dir")]
    pub dir: PathBuf,
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("build")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_artifacts_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ephemeral: NetworkConfig::ephemeral_default(),
            persistent: NetworkConfig::default(),
            artifacts: ArtifactsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_with(config_dir.as_ref(), Self::env_overrides())
    }

    /// Environment variables override files, e.g. `ORGDEPLOY__PERSISTENT__RPC_URL`
    fn env_overrides() -> Environment {
        Environment::with_prefix("ORGDEPLOY")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with(config_dir: &Path, overrides: Environment) -> Result<Self, ConfigError> {

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("ephemeral.rpc_url", "http://127.0.0.1:8545")?
            .set_default("artifacts.dir", "build")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load deployment-specific config (e.g., config/staging.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ORGDEPLOY_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            .add_source(overrides);

        builder.build()?.try_deserialize()
    }

    pub fn network(&self, kind: EnvironmentKind) -> &NetworkConfig {
        match kind {
            EnvironmentKind::Ephemeral => &self.ephemeral,
            EnvironmentKind::Persistent => &self.persistent,
        }
    }

    /// Validate the settings needed to provision onto `kind`
    pub fn validate(&self, kind: EnvironmentKind) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let network = self.network(kind);
        let section = kind.as_str();

        if network.rpc_url.trim().is_empty() {
            errors.push(format!("{section}.rpc_url must be set"));
        } else if url::Url::parse(&network.rpc_url).is_err() {
            errors.push(format!("{section}.rpc_url is not a valid URL: {}", network.rpc_url));
        }

        if network.gas_limit == 0 {
            errors.push(format!("{section}.gas_limit must be positive"));
        }

        if network.gas_price_wei == 0 {
            errors.push(format!("{section}.gas_price_wei must be positive"));
        }

        if network.confirmation_timeout_secs == 0 {
            errors.push(format!("{section}.confirmation_timeout_secs must be positive"));
        }

        if kind == EnvironmentKind::Persistent {
            for (field, value) in [
                ("treasury", &network.treasury),
                ("whitelister", &network.whitelister),
                ("stable_token", &network.stable_token),
            ] {
                if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                    errors.push(format!("persistent.{field} must be set"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
