//! Chain module - blockchain client access per configured network
//!
//! This module provides:
//! - The `ChainClient` seam used by payload building and broadcasting
//! - Multi-RPC provider management with automatic failover
//! - A registry of enabled networks with their explorer settings

pub mod provider;

pub use provider::ChainProvider;

use crate::config::Settings;
use crate::error::{ComposerError, ComposerResult};
use crate::wallet::SignatureArtifact;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::types::H256;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Blockchain client operations the submission workflow depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Number of transactions sent from `address`, i.e. its next nonce
    async fn transaction_count(&self, address: &str) -> ComposerResult<u64>;

    async fn chain_id(&self) -> ComposerResult<u64>;

    /// Broadcast a signed transaction and return its hash
    async fn send_signed_transaction(&self, artifact: &SignatureArtifact) -> ComposerResult<H256>;

    async fn block_number(&self) -> ComposerResult<u64>;
}

/// A configured network and the client used to reach it
#[derive(Clone)]
pub struct Network {
    pub name: String,
    pub token_symbol: String,
    pub explorer_base_url: String,
    pub client: Arc<dyn ChainClient>,
}

impl Network {
    /// Block explorer link for a transaction hash
    pub fn explorer_url(&self, tx_hash: H256) -> String {
        explorer_url(&self.explorer_base_url, tx_hash)
    }

    pub fn summary(&self, default_network: &str) -> NetworkSummary {
        NetworkSummary {
            name: self.name.clone(),
            token_symbol: self.token_symbol.clone(),
            explorer_base_url: self.explorer_base_url.clone(),
            default: self.name == default_network,
        }
    }
}

/// Concatenate the explorer base with the full `0x` transaction hash
pub fn explorer_url(base: &str, tx_hash: H256) -> String {
    format!("{}{:?}", base, tx_hash)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkSummary {
    pub name: String,
    pub token_symbol: String,
    pub explorer_base_url: String,
    pub default: bool,
}

/// Manages connections to all enabled networks
pub struct ChainManager {
    networks: DashMap<String, Network>,
    default_network: String,
}

impl ChainManager {
    /// Create providers for every enabled network
    pub fn new(settings: &Settings) -> ComposerResult<Self> {
        let mut networks = Vec::new();

        for (name, network_config) in settings.enabled_networks() {
            let provider = ChainProvider::new(name, network_config.clone())?;
            info!(
                "Configured network {} with {} RPC endpoint(s)",
                name,
                network_config.rpc_urls.len()
            );
            networks.push(Network {
                name: name.clone(),
                token_symbol: network_config.token_symbol.clone(),
                explorer_base_url: network_config.explorer_base_url.clone(),
                client: Arc::new(provider),
            });
        }

        Self::from_networks(&settings.default_network, networks)
    }

    /// Build a manager from already constructed networks
    pub fn from_networks(default_network: &str, networks: Vec<Network>) -> ComposerResult<Self> {
        let map = DashMap::new();
        for network in networks {
            map.insert(network.name.clone(), network);
        }

        if !map.contains_key(default_network) {
            return Err(ComposerError::NetworkNotFound(default_network.to_string()));
        }

        Ok(Self {
            networks: map,
            default_network: default_network.to_string(),
        })
    }

    /// Look up a network, falling back to the default when no name is given
    pub fn get(&self, name: Option<&str>) -> ComposerResult<Network> {
        let name = name.unwrap_or(&self.default_network);
        self.networks
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ComposerError::NetworkNotFound(name.to_string()))
    }

    pub fn default_network(&self) -> &str {
        &self.default_network
    }

    /// Summaries of all networks, sorted by name
    pub fn summaries(&self) -> Vec<NetworkSummary> {
        let mut summaries: Vec<_> = self
            .networks
            .iter()
            .map(|entry| entry.value().summary(&self.default_network))
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Health check all networks
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let networks: Vec<Network> = self.networks.iter().map(|e| e.value().clone()).collect();
        let mut results = Vec::with_capacity(networks.len());

        for network in networks {
            let healthy = match network.client.block_number().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Health check failed for network {}: {}", network.name, e);
                    false
                }
            };
            crate::metrics::record_network_health(&network.name, healthy);
            results.push((network.name, healthy));
        }

        results.sort();
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn network(name: &str, client: MockChainClient) -> Network {
        Network {
            name: name.to_string(),
            token_symbol: "METC".to_string(),
            explorer_base_url: format!("https://explorer.example/{}/tx/", name),
            client: Arc::new(client),
        }
    }

    #[test]
    fn test_explorer_url_uses_full_hash() {
        let hash = H256::repeat_byte(0xab);
        let url = explorer_url("https://explorer.example/tx/", hash);
        assert_eq!(url, format!("https://explorer.example/tx/0x{}", "ab".repeat(32)));
    }

    #[test]
    fn test_get_falls_back_to_default() {
        let manager = ChainManager::from_networks(
            "mordor",
            vec![
                network("mordor", MockChainClient::new()),
                network("classic", MockChainClient::new()),
            ],
        )
        .unwrap();

        assert_eq!(manager.get(None).unwrap().name, "mordor");
        assert_eq!(manager.get(Some("classic")).unwrap().name, "classic");
        assert!(matches!(
            manager.get(Some("kotti")),
            Err(ComposerError::NetworkNotFound(_))
        ));

        let names: Vec<_> = manager.summaries().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["classic", "mordor"]);
    }

    #[test]
    fn test_unknown_default_is_rejected() {
        let result =
            ChainManager::from_networks("kotti", vec![network("mordor", MockChainClient::new())]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_check_reports_each_network() {
        let mut healthy = MockChainClient::new();
        healthy.expect_block_number().returning(|| Ok(100));
        let mut broken = MockChainClient::new();
        broken.expect_block_number().returning(|| {
            Err(ComposerError::ChainConnection {
                network: "classic".to_string(),
                message: "All providers failed".to_string(),
            })
        });

        let manager = ChainManager::from_networks(
            "mordor",
            vec![network("mordor", healthy), network("classic", broken)],
        )
        .unwrap();

        assert_eq!(
            manager.health_check().await,
            vec![("classic".to_string(), false), ("mordor".to_string(), true)]
        );
    }
}
