//! Nonce resolution for the treasury account.

use std::sync::Arc;

use alloy::primitives::Address;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::domain::RpcError;

use super::failover::FailoverCaller;
use super::rpc::parse_quantity;

const PENDING_NONCE_REQUEST_ID: u64 = 1;
const LATEST_NONCE_REQUEST_ID: u64 = 2;

/// Resolves the next nonce by reconciling the `pending` and `latest`
/// transaction counts.
pub struct NonceResolver {
    caller: Arc<FailoverCaller>,
}

impl NonceResolver {
    #[must_use]
    pub fn new(caller: Arc<FailoverCaller>) -> Self {
        Self { caller }
    }

    /// Fetch both counts and reconcile them. Fails only when both fail.
    #[instrument(skip(self), fields(account = %account))]
    pub async fn resolve(&self, account: Address) -> Result<u64, RpcError> {
        let pending = self
            .transaction_count(account, "pending", PENDING_NONCE_REQUEST_ID)
            .await;
        let latest = self
            .transaction_count(account, "latest", LATEST_NONCE_REQUEST_ID)
            .await;
        reconcile(pending, latest)
    }

    async fn transaction_count(
        &self,
        account: Address,
        block: &str,
        id: u64,
    ) -> Result<u64, RpcError> {
        let count = self
            .caller
            .call_with(
                "eth_getTransactionCount",
                json!([account.to_string(), block]),
                id,
                |value| {
                    let quantity = parse_quantity(&value)?;
                    u64::try_from(quantity).map_err(|_| format!("nonce {} out of range", quantity))
                },
            )
            .await?;
        debug!(block = block, count = count, "Fetched transaction count");
        Ok(count)
    }
}

/// `max(pending, latest)`. A provider that under-reports pending state is
/// covered by `latest`; an unmined transaction is covered by `pending`.
pub fn reconcile(
    pending: Result<u64, RpcError>,
    latest: Result<u64, RpcError>,
) -> Result<u64, RpcError> {
    match (pending, latest) {
        (Ok(pending), Ok(latest)) => Ok(pending.max(latest)),
        (Ok(pending), Err(e)) => {
            warn!(error = %e, "Latest transaction count unavailable, using pending count");
            Ok(pending)
        }
        (Err(e), Ok(latest)) => {
            warn!(error = %e, "Pending transaction count unavailable, using latest count");
            Ok(latest)
        }
        (Err(e), Err(_)) => Err(e),
    }
}
