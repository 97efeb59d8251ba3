//! Transaction payload assembly: unit conversion, gas, nonce resolution

mod gas;
mod nonce;
mod payload;
pub mod units;

pub use payload::{PayloadBuilder, RawFields, SignTransactionParams};
