//! Nonce resolution for form submissions
//!
//! An explicit nonce on the form wins. A blank or non-numeric entry falls back
//! to the sender's current transaction count as reported by the chain.

use crate::chain::ChainClient;
use crate::error::{ComposerError, ComposerResult};

use serde::Serialize;
use tracing::{debug, info};

/// Where the nonce of a built request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NonceSource {
    Form,
    Chain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedNonce {
    pub value: u64,
    pub source: NonceSource,
}

/// Parse the nonce field. `Ok(None)` means the chain should be asked.
pub fn parse_nonce(raw: &str) -> ComposerResult<Option<u64>> {
    let raw = raw.trim();

    if let Some(digits) = raw.strip_prefix('-') {
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ComposerError::validation("nonce", "must not be negative"));
        }
    }

    Ok(raw.parse::<u64>().ok())
}

/// Resolve the nonce for `from`, querying the chain when the form left it open
pub async fn resolve_nonce(
    raw: &str,
    from: &str,
    chain: &dyn ChainClient,
) -> ComposerResult<ResolvedNonce> {
    match parse_nonce(raw)? {
        Some(value) => {
            debug!("Using nonce {} from form for {}", value, from);
            Ok(ResolvedNonce {
                value,
                source: NonceSource::Form,
            })
        }
        None => {
            let value = chain.transaction_count(from).await?;
            info!(
                "Nonce field {:?} not numeric, using transaction count {} for {}",
                raw.trim(),
                value,
                from
            );
            Ok(ResolvedNonce {
                value,
                source: NonceSource::Chain,
            })
        }
    }
}
