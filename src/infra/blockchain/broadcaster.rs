//! Raw transaction submission and propagation check.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::RpcError;

use super::failover::FailoverCaller;
use super::transaction::SignedTransaction;

const SEND_REQUEST_ID: u64 = 4;
const LOOKUP_REQUEST_ID: u64 = 5;

/// Submits signed transactions through the failover caller.
pub struct Broadcaster {
    caller: Arc<FailoverCaller>,
    verify_delay: Option<Duration>,
}

impl Broadcaster {
    /// `verify_delay` of `None` disables the post-broadcast lookup.
    #[must_use]
    pub fn new(caller: Arc<FailoverCaller>, verify_delay: Option<Duration>) -> Self {
        Self {
            caller,
            verify_delay,
        }
    }

    pub fn verifies(&self) -> bool {
        self.verify_delay.is_some()
    }

    /// `eth_sendRawTransaction`. Returns the provider-issued hash.
    #[instrument(skip(self, signed), fields(local_hash = %signed.hash))]
    pub async fn submit(&self, signed: &SignedTransaction) -> Result<B256, RpcError> {
        let hash = self
            .caller
            .call_with(
                "eth_sendRawTransaction",
                json!([signed.raw.to_string()]),
                SEND_REQUEST_ID,
                |value| {
                    let raw = value
                        .as_str()
                        .ok_or_else(|| format!("expected transaction hash, got {}", value))?;
                    B256::from_str(raw)
                        .map_err(|e| format!("invalid transaction hash '{}': {}", raw, e))
                },
            )
            .await?;

        if hash != signed.hash {
            warn!(
                provider_hash = %hash,
                local_hash = %signed.hash,
                "Provider returned a different transaction hash"
            );
        }
        info!(tx_hash = %hash, "Transaction accepted by provider");
        Ok(hash)
    }

    /// Wait, then look the transaction up by hash. Never fails the dispatch:
    /// lookup errors and unknown hashes both report `false`.
    #[instrument(skip(self), fields(tx_hash = %hash))]
    pub async fn confirm(&self, hash: B256) -> bool {
        let Some(delay) = self.verify_delay else {
            return false;
        };
        tokio::time::sleep(delay).await;

        match self
            .caller
            .call::<Option<serde_json::Value>>(
                "eth_getTransactionByHash",
                json!([hash.to_string()]),
                LOOKUP_REQUEST_ID,
            )
            .await
        {
            Ok(Some(_)) => {
                info!("Transaction visible on network");
                true
            }
            Ok(None) => {
                warn!("Transaction not yet visible on network");
                false
            }
            Err(e) => {
                warn!(error = %e, "Propagation check failed");
                false
            }
        }
    }
}
