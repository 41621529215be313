//! Sequential failover across the endpoint pool.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{info, instrument, warn};

use crate::domain::{Endpoint, RpcError, RpcRequest, RpcTransport};

use super::pool::EndpointPool;
use super::rpc::parse_quantity;

/// Makes one logical RPC call resilient to individual endpoint failure.
///
/// Endpoints are tried strictly in pool order and the first success wins.
/// Results are decoded per endpoint, so a provider that answers with garbage
/// counts as a failed endpoint rather than failing the whole call.
pub struct FailoverCaller {
    transport: Arc<dyn RpcTransport>,
    pool: Arc<EndpointPool>,
}

impl FailoverCaller {
    #[must_use]
    pub fn new(transport: Arc<dyn RpcTransport>, pool: Arc<EndpointPool>) -> Self {
        Self { transport, pool }
    }

    pub fn pool(&self) -> &EndpointPool {
        &self.pool
    }

    /// Call `method` and deserialize the result with serde.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
        id: u64,
    ) -> Result<R, RpcError> {
        self.call_with(method, params, id, |value| {
            serde_json::from_value(value).map_err(|e| e.to_string())
        })
        .await
    }

    /// Call `method` and decode a hex quantity result.
    pub async fn call_quantity(
        &self,
        method: &str,
        params: serde_json::Value,
        id: u64,
    ) -> Result<u128, RpcError> {
        self.call_with(method, params, id, |value| parse_quantity(&value))
            .await
    }

    /// Call `method`, accepting the first endpoint whose result `decode` accepts.
    #[instrument(skip(self, params, decode), fields(method = %method, id = id))]
    pub async fn call_with<R, F>(
        &self,
        method: &str,
        params: serde_json::Value,
        id: u64,
        decode: F,
    ) -> Result<R, RpcError>
    where
        F: Fn(serde_json::Value) -> Result<R, String>,
    {
        let request = RpcRequest::new(method, params, id);
        let mut last_error = None;

        for endpoint in self.pool.endpoints() {
            let outcome = match self.transport.call(endpoint, &request).await {
                Ok(value) => decode(value).map_err(|message| unusable_result(endpoint, message)),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(result) => {
                    if endpoint.index() > 0 {
                        info!(
                            endpoint = %endpoint.label(),
                            index = endpoint.index(),
                            "RPC call served by fallback endpoint"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    warn!(
                        endpoint = %endpoint.label(),
                        index = endpoint.index(),
                        kind = ?e.kind(),
                        transient = e.is_transient(),
                        error = %e,
                        "RPC call failed, trying next endpoint"
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| RpcError::Transport {
            endpoint: "none".to_string(),
            message: "no endpoints configured".to_string(),
            transient: false,
        });
        Err(RpcError::Exhausted {
            method: method.to_string(),
            attempts: self.pool.len(),
            last: Box::new(last),
        })
    }
}

fn unusable_result(endpoint: &Endpoint, message: String) -> RpcError {
    RpcError::Protocol {
        endpoint: endpoint.label(),
        code: None,
        message,
        transient: false,
    }
}
