//! Domain traits defining contracts for external systems.

use async_trait::async_trait;

use super::error::RpcError;
use super::types::{Endpoint, RpcRequest};

/// Executes exactly one JSON-RPC call against exactly one endpoint.
///
/// Implementations classify failures (transport vs protocol, transient vs
/// permanent) and never retry; retrying across endpoints belongs to the
/// failover layer.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Returns the decoded `result` member (`null` when absent).
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<serde_json::Value, RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTransport;

    #[async_trait]
    impl RpcTransport for EchoTransport {
        async fn call(
            &self,
            endpoint: &Endpoint,
            request: &RpcRequest,
        ) -> Result<serde_json::Value, RpcError> {
            Ok(serde_json::json!({
                "endpoint": endpoint.index(),
                "method": request.method,
                "id": request.id,
            }))
        }
    }

    #[tokio::test]
    async fn test_transport_as_trait_object() {
        let transport: Box<dyn RpcTransport> = Box::new(EchoTransport);
        let endpoint = Endpoint::parse(3, "http://node.test").unwrap();
        let request = RpcRequest::new("eth_chainId", serde_json::json!([]), 7);

        let value = transport.call(&endpoint, &request).await.unwrap();
        assert_eq!(value["endpoint"], 3);
        assert_eq!(value["method"], "eth_chainId");
        assert_eq!(value["id"], 7);
    }
}
