//! HTTP JSON-RPC client for a single EVM endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{AppError, Endpoint, RpcError, RpcRequest, RpcTransport};

/// JSON-RPC codes providers use for throttling and overload.
const TRANSIENT_RPC_CODES: &[i64] = &[-32005, -32603, 429];

/// Provider wording for throttling and overload, matched case-insensitively.
const TRANSIENT_RPC_PHRASES: &[&str] = &[
    "rate limit",
    "too many requests",
    "timeout",
    "timed out",
    "temporarily unavailable",
];

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    /// Per-call HTTP timeout
    pub timeout: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// Providers disagree on the error shape: some omit `code`, a few send a
/// bare string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonRpcError {
    Object {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        message: Option<String>,
    },
    Message(String),
}

impl JsonRpcError {
    fn into_parts(self) -> (Option<i64>, String) {
        match self {
            Self::Object { code, message } => (
                code,
                message.unwrap_or_else(|| "provider error without a message".to_string()),
            ),
            Self::Message(message) => (None, message),
        }
    }
}

/// reqwest-backed [`RpcTransport`]. No retries at this layer.
pub struct HttpRpcClient {
    http_client: Client,
}

impl HttpRpcClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http_client })
    }

    pub fn with_defaults() -> Result<Self, AppError> {
        Self::new(RpcClientConfig::default())
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    #[instrument(skip(self, endpoint, request), fields(endpoint = %endpoint.label(), method = %request.method, id = request.id))]
    async fn call(
        &self,
        endpoint: &Endpoint,
        request: &RpcRequest,
    ) -> Result<serde_json::Value, RpcError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: request.id,
            method: &request.method,
            params: &request.params,
        };

        let response = self
            .http_client
            .post(endpoint.url().clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport {
                endpoint: endpoint.label(),
                message: format!("HTTP {}", status),
                transient: is_transient_status(status),
            });
        }

        let rpc_response: JsonRpcResponse =
            response.json().await.map_err(|e| RpcError::Protocol {
                endpoint: endpoint.label(),
                code: None,
                message: format!("invalid JSON-RPC body: {}", e.without_url()),
                transient: false,
            })?;

        if let Some(error) = rpc_response.error {
            let (code, message) = error.into_parts();
            debug!(code = ?code, "Provider returned an RPC error");
            return Err(classify_protocol(endpoint, code, message));
        }

        Ok(rpc_response.result.unwrap_or(serde_json::Value::Null))
    }
}

fn classify_transport(endpoint: &Endpoint, err: reqwest::Error) -> RpcError {
    let transient = err.is_timeout() || err.is_connect() || err.is_request();
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.without_url().to_string()
    };
    RpcError::Transport {
        endpoint: endpoint.label(),
        message,
        transient,
    }
}

/// Decide once whether a provider-reported error is worth retrying.
pub(crate) fn classify_protocol(
    endpoint: &Endpoint,
    code: Option<i64>,
    message: String,
) -> RpcError {
    let lowered = message.to_ascii_lowercase();
    let transient = code.is_some_and(|code| TRANSIENT_RPC_CODES.contains(&code))
        || TRANSIENT_RPC_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase));
    RpcError::Protocol {
        endpoint: endpoint.label(),
        code,
        message,
        transient,
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Parse an Ethereum hex quantity (`"0x1a"`).
pub fn parse_quantity(value: &serde_json::Value) -> Result<u128, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("expected hex quantity, got {}", value))?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| format!("quantity '{}' is not 0x-prefixed", raw))?;
    if digits.is_empty() {
        return Err("empty quantity".to_string());
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("invalid quantity '{}': {}", raw, e))
}
