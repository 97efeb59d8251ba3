//! Transaction payload assembly
//!
//! Turns the raw strings of a transaction form into a chain-correct request
//! ready for the wallet's `signTransaction` call.

use super::gas::GasSettings;
use super::nonce::{parse_nonce, resolve_nonce, NonceSource};
use super::units::{hex_quantity, to_base_units};
use crate::chain::ChainClient;
use crate::error::{ComposerError, ComposerResult};

use ethers::types::{Bytes, U256};
use ethers::utils::Units;
use futures::future::try_join;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Unvalidated form input. Missing fields deserialize as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawFields {
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas_limit: String,
    pub gas_price: String,
    pub nonce: Option<String>,
    pub data: Option<String>,
}

/// Fully resolved transaction request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: String,
    pub to: String,
    /// Amount in wei
    pub value: U256,
    pub gas: GasSettings,
    pub nonce: u64,
    pub nonce_source: NonceSource,
    pub data: Bytes,
}

/// Wire shape of the transaction object passed to `signTransaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionParams {
    pub from: String,
    pub nonce: String,
    pub gas: String,
    pub gas_price: String,
    pub to: String,
    pub value: String,
    pub data: String,
}

/// Built request together with the chain id it must be signed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    pub request: TransactionRequest,
    pub chain_id: u64,
}

impl TransactionRequest {
    pub fn to_rpc_params(&self) -> SignTransactionParams {
        SignTransactionParams {
            from: self.from.clone(),
            nonce: hex_quantity(U256::from(self.nonce)),
            gas: hex_quantity(U256::from(self.gas.limit)),
            gas_price: hex_quantity(self.gas.price),
            to: self.to.clone(),
            value: hex_quantity(self.value),
            data: format!("0x{}", hex::encode(&self.data)),
        }
    }
}

impl BuiltPayload {
    pub fn chain_id_hex(&self) -> String {
        format!("0x{:x}", self.chain_id)
    }
}

/// Encode the data field. An empty field becomes a single zero byte so the
/// wallet sees an explicit payload rather than the empty `0x` marker.
pub fn encode_data(raw: &str) -> Bytes {
    if raw.is_empty() {
        Bytes::from(vec![0u8])
    } else {
        Bytes::from(raw.as_bytes().to_vec())
    }
}

fn required(field: &'static str, raw: &str) -> ComposerResult<String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ComposerError::validation(field, "is required"));
    }
    Ok(value.to_string())
}

/// Builds signing payloads against one chain
#[derive(Clone)]
pub struct PayloadBuilder {
    chain: Arc<dyn ChainClient>,
}

impl PayloadBuilder {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// Validate `raw` and resolve the nonce and chain id.
    ///
    /// Every field is checked before the chain is contacted, so a validation
    /// failure never costs an RPC round trip.
    pub async fn build(&self, raw: &RawFields) -> ComposerResult<BuiltPayload> {
        let from = required("from", &raw.from)?;
        let to = required("to", &raw.to)?;
        let value = to_base_units(&raw.value, Units::Ether)
            .map_err(|e| ComposerError::validation("value", e.to_string()))?;
        let gas = GasSettings::parse(&raw.gas_limit, &raw.gas_price)?;
        let nonce_raw = raw.nonce.as_deref().unwrap_or("").trim();
        parse_nonce(nonce_raw)?;
        let data = encode_data(raw.data.as_deref().unwrap_or("").trim());

        let (nonce, chain_id) = try_join(
            resolve_nonce(nonce_raw, &from, self.chain.as_ref()),
            self.chain.chain_id(),
        )
        .await?;

        debug!(
            "Built payload {} -> {} value={} wei gas={} price={} gwei max_fee={} wei nonce={} chain={}",
            from,
            to,
            value,
            gas.limit,
            gas.price_gwei(),
            gas.max_cost(),
            nonce.value,
            chain_id
        );

        Ok(BuiltPayload {
            request: TransactionRequest {
                from,
                to,
                value,
                gas,
                nonce: nonce.value,
                nonce_source: nonce.source,
                data,
            },
            chain_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;

    fn sample_fields() -> RawFields {
        RawFields {
            from: "0xAAA".to_string(),
            to: "0xBBB".to_string(),
            value: "0.1".to_string(),
            gas_limit: "23000".to_string(),
            gas_price: "0.08".to_string(),
            nonce: Some(String::new()),
            data: Some(String::new()),
        }
    }

    fn chain_with(count: u64, chain_id: u64) -> Arc<dyn ChainClient> {
        let mut chain = MockChainClient::new();
        chain
            .expect_transaction_count()
            .returning(move |_| Ok(count));
        chain.expect_chain_id().returning(move || Ok(chain_id));
        Arc::new(chain)
    }

    #[tokio::test]
    async fn test_form_sample_builds_expected_request() {
        let builder = PayloadBuilder::new(chain_with(9, 63));
        let payload = builder.build(&sample_fields()).await.unwrap();

        assert_eq!(payload.chain_id, 63);
        assert_eq!(payload.chain_id_hex(), "0x3f");
        assert_eq!(payload.request.nonce, 9);
        assert_eq!(payload.request.nonce_source, NonceSource::Chain);

        let params = payload.request.to_rpc_params();
        assert_eq!(params.data, "0x00");
        assert_eq!(params.gas, "0x59d8");
        assert_eq!(params.value, "0x16345785d8a0000");
        assert_eq!(params.gas_price, "0x4c4b400");
        assert_eq!(params.nonce, "0x9");
    }

    #[tokio::test]
    async fn test_fields_are_trimmed_and_data_hex_encoded() {
        let mut fields = sample_fields();
        fields.from = "  0xAAA ".to_string();
        fields.nonce = Some(" 3 ".to_string());
        fields.data = Some(" hi ".to_string());

        let mut chain = MockChainClient::new();
        chain.expect_transaction_count().never();
        chain.expect_chain_id().returning(|| Ok(1));

        let payload = PayloadBuilder::new(Arc::new(chain))
            .build(&fields)
            .await
            .unwrap();
        let params = payload.request.to_rpc_params();
        assert_eq!(params.from, "0xAAA");
        assert_eq!(params.nonce, "0x3");
        assert_eq!(params.data, "0x6869");
        assert_eq!(payload.request.nonce_source, NonceSource::Form);
    }

    #[tokio::test]
    async fn test_missing_fields_deserialize_as_blank() {
        let fields: RawFields = serde_json::from_value(serde_json::json!({
            "from": "0xAAA",
            "to": "0xBBB",
            "value": "1",
            "gasLimit": "21000",
            "gasPrice": "1"
        }))
        .unwrap();

        let payload = PayloadBuilder::new(chain_with(2, 1))
            .build(&fields)
            .await
            .unwrap();
        assert_eq!(payload.request.nonce, 2);
        assert_eq!(payload.request.data, Bytes::from(vec![0u8]));
    }

    #[tokio::test]
    async fn test_validation_fails_before_any_chain_call() {
        let cases: [(&str, fn(&mut RawFields)); 5] = [
            ("from", |f| f.from = "   ".to_string()),
            ("to", |f| f.to.clear()),
            ("value", |f| f.value = "ten".to_string()),
            ("gasLimit", |f| f.gas_limit = "lots".to_string()),
            ("gasPrice", |f| f.gas_price = "1.2.3".to_string()),
        ];

        for (field, mutate) in cases {
            let mut chain = MockChainClient::new();
            chain.expect_transaction_count().never();
            chain.expect_chain_id().never();

            let mut fields = sample_fields();
            mutate(&mut fields);
            let err = PayloadBuilder::new(Arc::new(chain))
                .build(&fields)
                .await
                .unwrap_err();
            assert_eq!(err.field(), Some(field));
        }
    }

    #[tokio::test]
    async fn test_chain_failure_propagates() {
        let mut chain = MockChainClient::new();
        chain.expect_transaction_count().returning(|_| {
            Err(ComposerError::ChainConnection {
                network: "mordor".to_string(),
                message: "connection refused".to_string(),
            })
        });
        chain.expect_chain_id().returning(|| Ok(63));

        let err = PayloadBuilder::new(Arc::new(chain))
            .build(&sample_fields())
            .await
            .unwrap_err();
        assert!(matches!(err, ComposerError::ChainConnection { .. }));
    }

    #[test]
    fn test_empty_data_is_zero_byte() {
        assert_eq!(encode_data(""), Bytes::from(vec![0u8]));
        assert_ne!(encode_data(""), Bytes::new());
    }
}
