//! Chain provider with multi-RPC support and automatic failover

use super::ChainClient;
use crate::config::NetworkConfig;
use crate::error::{rpc_error_detail, ComposerError, ComposerResult};
use crate::wallet::SignatureArtifact;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Network name from configuration
    name: String,
    /// Network configuration
    config: NetworkConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(name: &str, config: NetworkConfig) -> ComposerResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    http_providers.push(provider.interval(Duration::from_millis(500)));
                    debug!("Added HTTP provider for network {}: {}", name, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(ComposerError::ChainConnection {
                network: name.to_string(),
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Network {} failover to provider {}", self.name, next);
    }

    fn connection_error(&self, message: impl Into<String>) -> ComposerError {
        ComposerError::ChainConnection {
            network: self.name.clone(),
            message: message.into(),
        }
    }

    /// Run a read-only call against each provider in turn until one succeeds
    async fn with_failover<T, F, Fut>(&self, method: &str, call: F) -> ComposerResult<T>
    where
        F: Fn(Provider<Http>) -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let timer = crate::metrics::RPC_LATENCY
            .with_label_values(&[method])
            .start_timer();

        for _ in 0..self.http_providers.len() {
            match call(self.http().clone()).await {
                Ok(value) => {
                    timer.observe_duration();
                    return Ok(value);
                }
                Err(e) => {
                    warn!("{} failed on network {}: {}", method, self.name, e);
                    self.failover();
                }
            }
        }

        timer.observe_duration();
        Err(self.connection_error(format!("All providers failed for {}", method)))
    }

    fn to_u64(&self, what: &str, value: U256) -> ComposerResult<u64> {
        if value > U256::from(u64::MAX) {
            return Err(self.connection_error(format!("{} {} does not fit in u64", what, value)));
        }
        Ok(value.low_u64())
    }

    async fn await_receipt(&self, pending: PendingTransaction<'_, Http>, confirmations: usize) {
        let tx_hash = pending.tx_hash();
        let wait = Duration::from_secs(self.config.receipt_timeout_secs);

        match timeout(wait, pending.confirmations(confirmations)).await {
            Ok(Ok(Some(receipt))) => info!(
                "Transaction {:?} confirmed in block {:?} on {}",
                tx_hash, receipt.block_number, self.name
            ),
            Ok(Ok(None)) => warn!("Transaction {:?} dropped from the mempool", tx_hash),
            Ok(Err(e)) => warn!("Failed waiting for receipt of {:?}: {}", tx_hash, e),
            Err(_) => warn!(
                "No receipt for {:?} after {}s, reporting hash anyway",
                tx_hash, self.config.receipt_timeout_secs
            ),
        }
    }
}

#[async_trait]
impl ChainClient for ChainProvider {
    async fn transaction_count(&self, address: &str) -> ComposerResult<u64> {
        let address: Address = address
            .parse()
            .map_err(|e| ComposerError::validation("from", format!("invalid address: {}", e)))?;

        let count = self
            .with_failover("eth_getTransactionCount", |provider| async move {
                provider.get_transaction_count(address, None).await
            })
            .await?;

        self.to_u64("transaction count", count)
    }

    async fn chain_id(&self) -> ComposerResult<u64> {
        let chain_id = self
            .with_failover("eth_chainId", |provider| async move {
                provider.get_chainid().await
            })
            .await?;
        let chain_id = self.to_u64("chain id", chain_id)?;

        if let Some(expected) = self.config.expected_chain_id {
            if expected != chain_id {
                return Err(ComposerError::ChainIdMismatch {
                    network: self.name.clone(),
                    expected,
                    actual: chain_id,
                });
            }
        }

        Ok(chain_id)
    }

    async fn send_signed_transaction(&self, artifact: &SignatureArtifact) -> ComposerResult<H256> {
        let timer = crate::metrics::RPC_LATENCY
            .with_label_values(&["eth_sendRawTransaction"])
            .start_timer();
        let result = self
            .http()
            .send_raw_transaction(artifact.as_bytes().clone())
            .await;
        timer.observe_duration();

        let pending = result.map_err(|e| ComposerError::Broadcast(rpc_error_detail(&e)))?;
        let tx_hash = pending.tx_hash();
        info!("Transaction sent on {}: {:?}", self.name, tx_hash);

        if let Some(confirmations) = self.config.receipt_confirmations {
            self.await_receipt(pending, confirmations).await;
        }

        Ok(tx_hash)
    }

    async fn block_number(&self) -> ComposerResult<u64> {
        let block = self
            .with_failover("eth_blockNumber", |provider| async move {
                provider.get_block_number().await
            })
            .await?;
        Ok(block.as_u64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(rpc_urls: Vec<&str>) -> NetworkConfig {
        NetworkConfig {
            rpc_urls: rpc_urls.into_iter().map(String::from).collect(),
            explorer_base_url: "https://explorer.example/tx/".to_string(),
            token_symbol: "ETC".to_string(),
            expected_chain_id: Some(61),
            receipt_confirmations: None,
            receipt_timeout_secs: 5,
            enabled: true,
        }
    }

    #[test]
    fn test_invalid_urls_are_skipped() {
        let provider =
            ChainProvider::new("classic", config(vec!["not a url", "http://127.0.0.1:8545"]))
                .unwrap();
        assert_eq!(provider.http_providers.len(), 1);
        assert_eq!(provider.name, "classic");
    }

    #[test]
    fn test_requires_a_valid_provider() {
        let result = ChainProvider::new("classic", config(vec!["not a url"]));
        assert!(matches!(result, Err(ComposerError::ChainConnection { .. })));
    }

    #[test]
    fn test_failover_rotates() {
        let provider = ChainProvider::new(
            "classic",
            config(vec!["http://127.0.0.1:8545", "http://127.0.0.1:8546"]),
        )
        .unwrap();
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 1);
        provider.failover();
        assert_eq!(provider.current_provider.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_bad_sender_address_is_a_validation_error() {
        let provider = ChainProvider::new("classic", config(vec!["http://127.0.0.1:8545"])).unwrap();
        let err = provider.transaction_count("0xAAA").await.unwrap_err();
        assert_eq!(err.field(), Some("from"));
    }
}
