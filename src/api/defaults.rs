//! Prefilled values for a new transaction form

use crate::chain::Network;
use crate::config::WalletConfig;

use serde::Serialize;

pub const SAMPLE_VALUE: &str = "0.1";
pub const SAMPLE_GAS_LIMIT: &str = "23000";
pub const SAMPLE_GAS_PRICE_GWEI: &str = "0.08";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDefaults {
    pub network: String,
    /// Label for the value field, e.g. `ETC`
    pub token_symbol: String,
    pub from: String,
    pub to: String,
    pub value: String,
    pub gas_limit: String,
    pub gas_price: String,
    pub nonce: String,
    pub data: String,
}

impl FormDefaults {
    /// Gas settings are always prefilled; the amount only in dev mode
    pub fn for_network(network: &Network, wallet: &WalletConfig, dev_mode: bool) -> Self {
        Self {
            network: network.name.clone(),
            token_symbol: network.token_symbol.clone(),
            from: wallet.default_from.clone().unwrap_or_default(),
            to: wallet.default_to.clone().unwrap_or_default(),
            value: if dev_mode {
                SAMPLE_VALUE.to_string()
            } else {
                String::new()
            },
            gas_limit: SAMPLE_GAS_LIMIT.to_string(),
            gas_price: SAMPLE_GAS_PRICE_GWEI.to_string(),
            nonce: String::new(),
            data: String::new(),
        }
    }
}
