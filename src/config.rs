//! Configuration management for the transaction composer
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::wallet::Passphrase;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub wallet: WalletConfig,
    pub default_network: String,
    /// Prefill sample amounts in form defaults
    #[serde(default)]
    pub dev_mode: bool,
    pub networks: HashMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// JSON-RPC endpoint of the signing wallet
    pub rpc_url: String,
    #[serde(default, deserialize_with = "non_blank")]
    pub passphrase: Option<Passphrase>,
    #[serde(default, deserialize_with = "non_blank")]
    pub default_from: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    pub default_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_urls: Vec<String>,
    /// Prefix the transaction hash is appended to
    pub explorer_base_url: String,
    pub token_symbol: String,
    pub expected_chain_id: Option<u64>,
    pub receipt_confirmations: Option<usize>,
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_session_idle_secs() -> u64 {
    1800
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_health_check_interval_secs() -> u64 {
    30
}

fn default_receipt_timeout_secs() -> u64 {
    120
}

fn default_enabled() -> bool {
    true
}

/// Blank values, such as an unset `${VAR}`, count as not configured
fn non_blank<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()).map(T::from))
}

impl Settings {
    /// Load settings from the file named by `TX_COMPOSER_CONFIG`, or the default file
    pub fn load() -> Result<Self> {
        let config_path = env::var("TX_COMPOSER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.wallet.rpc_url.trim().is_empty() {
            anyhow::bail!("Wallet RPC URL must be configured");
        }

        match self.networks.get(&self.default_network) {
            Some(network) if network.enabled => {}
            Some(_) => anyhow::bail!("Default network {} is disabled", self.default_network),
            None => anyhow::bail!("Default network {} is not configured", self.default_network),
        }

        for (name, network) in self.enabled_networks() {
            if network.rpc_urls.is_empty() {
                anyhow::bail!("Network {} has no RPC URLs configured", name);
            }
            if network.explorer_base_url.is_empty() {
                anyhow::bail!("Network {} has no explorer base URL", name);
            }
        }

        Ok(())
    }

    /// Get list of enabled networks
    pub fn enabled_networks(&self) -> Vec<(&String, &NetworkConfig)> {
        self.networks.iter().filter(|(_, n)| n.enabled).collect()
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    let mut result = input.to_string();
    for cap in ENV_VAR.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
