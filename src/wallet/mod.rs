//! Wallet RPC transport for signing transactions
//!
//! The wallet exposes a JSON-RPC `signTransaction` method taking the
//! transaction object, the account passphrase and the hex chain id, and
//! returns the raw signed transaction ready for broadcast.

use crate::error::{rpc_error_detail, ComposerError, ComposerResult};
use crate::tx::SignTransactionParams;

use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Provider, ProviderError};
use ethers::types::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// JSON-RPC method used for signing
pub const SIGN_TRANSACTION_METHOD: &str = "signTransaction";

/// Signed transaction payload returned by the wallet
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureArtifact(Bytes);

impl SignatureArtifact {
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for SignatureArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureArtifact({} bytes)", self.0.len())
    }
}

impl FromStr for SignatureArtifact {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)?;
        if bytes.is_empty() {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self(Bytes::from(bytes)))
    }
}

/// Wallet account passphrase. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Passphrase(String);

impl Passphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(***)")
    }
}

/// Signing side of the wallet
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletRpc: Send + Sync {
    /// Ask the wallet to sign `request` for the chain identified by `chain_id_hex`
    async fn sign_transaction(
        &self,
        request: &SignTransactionParams,
        passphrase: &Passphrase,
        chain_id_hex: &str,
    ) -> ComposerResult<SignatureArtifact>;
}

/// JSON-RPC wallet client, over HTTP unless another transport is given
pub struct WalletClient<P = Http> {
    provider: Provider<P>,
    url: String,
}

impl WalletClient<Http> {
    pub fn new(url: &str) -> ComposerResult<Self> {
        let provider = Provider::<Http>::try_from(url)
            .map_err(|e| ComposerError::Config(format!("Invalid wallet RPC URL {}: {}", url, e)))?;

        Ok(Self {
            provider,
            url: url.to_string(),
        })
    }
}

impl<P> WalletClient<P> {
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<P: JsonRpcClient> WalletRpc for WalletClient<P> {
    async fn sign_transaction(
        &self,
        request: &SignTransactionParams,
        passphrase: &Passphrase,
        chain_id_hex: &str,
    ) -> ComposerResult<SignatureArtifact> {
        debug!(
            "Requesting signature from {} for {} (chain {})",
            self.url, request.from, chain_id_hex
        );

        let timer = crate::metrics::RPC_LATENCY
            .with_label_values(&[SIGN_TRANSACTION_METHOD])
            .start_timer();
        let result: Result<String, ProviderError> = self
            .provider
            .request(SIGN_TRANSACTION_METHOD, (request, passphrase, chain_id_hex))
            .await;
        timer.observe_duration();

        let raw = result.map_err(|e| {
            warn!("Wallet rejected signTransaction: {}", e);
            ComposerError::Signing(rpc_error_detail(&e))
        })?;

        raw.parse::<SignatureArtifact>().map_err(|e| {
            ComposerError::Signing(format!("wallet returned a malformed signature: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse};
    use serde_json::json;

    fn sample_params() -> SignTransactionParams {
        SignTransactionParams {
            from: "0xAAA".to_string(),
            nonce: "0x7".to_string(),
            gas: "0x59d8".to_string(),
            gas_price: "0x4c4b400".to_string(),
            to: "0xBBB".to_string(),
            value: "0x16345785d8a0000".to_string(),
            data: "0x00".to_string(),
        }
    }

    fn mocked_wallet(response: MockResponse) -> (WalletClient<MockProvider>, MockProvider) {
        let (provider, mock) = Provider::mocked();
        mock.push_response(response);
        let client = WalletClient {
            provider,
            url: "mock://wallet".to_string(),
        };
        (client, mock)
    }

    #[tokio::test]
    async fn test_sign_sends_positional_params() {
        let (wallet, mock) = mocked_wallet(MockResponse::Value(json!("0xf86b01")));
        let params = sample_params();
        let passphrase = Passphrase::new("secret");

        let artifact = wallet
            .sign_transaction(&params, &passphrase, "0x3f")
            .await
            .unwrap();
        assert_eq!(artifact.to_hex(), "0xf86b01");
        mock.assert_request(SIGN_TRANSACTION_METHOD, (&params, &passphrase, "0x3f"))
            .unwrap();
    }

    #[tokio::test]
    async fn test_wallet_rejection_uses_data_message() {
        let (wallet, _mock) = mocked_wallet(MockResponse::Error(JsonRpcError {
            code: -32000,
            message: "execution reverted".to_string(),
            data: Some(json!({ "message": "insufficient funds" })),
        }));

        let err = wallet
            .sign_transaction(&sample_params(), &Passphrase::new("secret"), "0x3f")
            .await
            .unwrap_err();
        assert_eq!(err, ComposerError::Signing("insufficient funds".to_string()));
    }

    #[tokio::test]
    async fn test_wallet_rejection_without_detail_is_generic() {
        let (wallet, _mock) = mocked_wallet(MockResponse::Error(JsonRpcError {
            code: -32000,
            message: String::new(),
            data: None,
        }));

        let err = wallet
            .sign_transaction(&sample_params(), &Passphrase::new("secret"), "0x3f")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ComposerError::Signing(crate::error::GENERIC_RPC_FAILURE.to_string())
        );
    }

    #[tokio::test]
    async fn test_malformed_signature_is_a_signing_error() {
        let (wallet, _mock) = mocked_wallet(MockResponse::Value(json!("not hex")));

        let err = wallet
            .sign_transaction(&sample_params(), &Passphrase::new("secret"), "0x3f")
            .await
            .unwrap_err();
        assert!(matches!(err, ComposerError::Signing(_)));
    }

    #[test]
    fn test_artifact_parses_with_and_without_prefix() {
        let with_prefix: SignatureArtifact = "0xf86b01".parse().unwrap();
        let without_prefix: SignatureArtifact = "f86b01".parse().unwrap();
        assert_eq!(with_prefix, without_prefix);
        assert_eq!(with_prefix.to_hex(), "0xf86b01");
        assert!("0x".parse::<SignatureArtifact>().is_err());
        assert!("0xzz".parse::<SignatureArtifact>().is_err());
    }

    #[test]
    fn test_passphrase_is_redacted() {
        let passphrase = Passphrase::new("correct horse");
        assert_eq!(format!("{:?}", passphrase), "Passphrase(***)");
        assert_eq!(serde_json::to_string(&passphrase).unwrap(), "\"correct horse\"");
    }

    #[test]
    fn test_sign_params_are_positional() {
        let request = sample_params();
        let passphrase = Passphrase::new("secret");
        let params = serde_json::to_value((&request, &passphrase, "0x3f")).unwrap();

        assert_eq!(params[0]["gasPrice"], "0x4c4b400");
        assert_eq!(params[1], "secret");
        assert_eq!(params[2], "0x3f");
    }
}
