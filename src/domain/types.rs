//! Domain types with validation support.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rand::RngCore;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use super::error::{ConfigError, ValidationError};

/// How the dispatcher produces outcomes. Fixed at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Sign and broadcast real transactions
    #[default]
    Real,
    /// Never touch the network; always return a flagged simulated outcome
    Simulated,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Simulated => "simulated",
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" | "production" => Ok(Self::Real),
            "simulated" | "test" => Ok(Self::Simulated),
            _ => Err(format!("Invalid dispatch mode: {}", s)),
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// States of a single reward dispatch.
///
/// `ResolvingNonce -> PricingGas -> Building -> Broadcasting -> Verifying -> Done`.
/// A failure in any state ends the dispatch as [`TransactionOutcome::Fallback`],
/// which records the state that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    ResolvingNonce,
    PricingGas,
    Building,
    Broadcasting,
    Verifying,
    Done,
}

impl DispatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolvingNonce => "resolving_nonce",
            Self::PricingGas => "pricing_gas",
            Self::Building => "building",
            Self::Broadcasting => "broadcasting",
            Self::Verifying => "verifying",
            Self::Done => "done",
        }
    }

    /// The state reached when the current one succeeds.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::ResolvingNonce => Self::PricingGas,
            Self::PricingGas => Self::Building,
            Self::Building => Self::Broadcasting,
            Self::Broadcasting => Self::Verifying,
            Self::Verifying | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One RPC provider. Position in the pool encodes preference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    index: usize,
    url: Url,
}

impl Endpoint {
    pub fn parse(index: usize, raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidEndpoint {
            index,
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                index,
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        Ok(Self { index, url })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Scheme, host and port only. Provider URLs often carry API keys in the
    /// path or query, so this is the only form that goes into logs and errors.
    pub fn label(&self) -> String {
        let host = self.url.host_str().unwrap_or("unknown");
        match self.url.port() {
            Some(port) => format!("{}://{}:{}", self.url.scheme(), host, port),
            None => format!("{}://{}", self.url.scheme(), host),
        }
    }
}

/// A single JSON-RPC call. The id is scoped to one logical operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: serde_json::Value,
    pub id: u64,
}

impl RpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }
}

/// Stand-in transaction identifier for fallback outcomes.
///
/// Shaped like a transaction hash (`0x` + 64 lowercase hex) but never valid
/// on chain. Kept as its own type so it cannot be mistaken for a real hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderHash(B256);

impl PlaceholderHash {
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(B256::from(bytes))
    }
}

impl fmt::Display for PlaceholderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a dispatch degraded to a fallback outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The service runs in simulated mode.
    Simulated,
    /// The real pipeline failed at `stage`.
    Failed {
        stage: DispatchStage,
        message: String,
        /// JSON-RPC error code of the last provider failure, when it sent one
        code: Option<i64>,
    },
}

/// Result of one reward dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// Signed and accepted by a provider.
    Sent { hash: B256, verified: bool },
    /// Nothing reached the chain; explicitly flagged as simulated.
    Fallback {
        placeholder: PlaceholderHash,
        reason: FallbackReason,
    },
}

impl TransactionOutcome {
    #[must_use]
    pub fn fallback(reason: FallbackReason) -> Self {
        Self::Fallback {
            placeholder: PlaceholderHash::random(),
            reason,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Parse a wallet address as submitted by the UI.
pub fn parse_recipient(raw: &str) -> Result<Address, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingRecipient);
    }
    if !trimmed.starts_with("0x") {
        return Err(ValidationError::InvalidRecipient(
            "address must be 0x-prefixed".to_string(),
        ));
    }
    Address::from_str(trimmed)
        .map_err(|_| ValidationError::InvalidRecipient("expected 20 bytes of hex".to_string()))
}

/// Request to claim the fixed reward
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct RewardRequest {
    /// Connected wallet address of the player
    #[serde(default)]
    #[validate(
        required(message = "Recipient address is required"),
        length(min = 1, message = "Recipient address is required")
    )]
    #[schema(example = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F")]
    pub recipient: Option<String>,
}

impl RewardRequest {
    #[must_use]
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient.into()),
        }
    }
}

/// Push-style notification text for the UI
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Notification {
    #[schema(example = "Reward Sent!")]
    pub title: String,
    #[schema(example = "You've received 0.002 USDC as a reward!")]
    pub body: String,
}

impl Notification {
    /// Verified sends carry a shortened hash the player can look up.
    fn sent(label: &str, hash: &B256, verified: bool) -> Self {
        let body = if verified {
            let full = hash.to_string();
            format!(
                "You've received {} as a reward! Tx {}...{}",
                label,
                &full[..10],
                &full[full.len() - 6..]
            )
        } else {
            format!("You've received {} as a reward!", label)
        };
        Self {
            title: "Reward Sent!".to_string(),
            body,
        }
    }
}

/// Claim response. Real and fallback outcomes share this shape; `fallback`
/// is the only field that says whether a real transfer happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RewardResponse {
    pub success: bool,
    /// Provider-issued hash, or a placeholder when `fallback` is true
    #[schema(example = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060")]
    pub transaction_hash: String,
    /// A provider returned the transaction when looked up by hash
    pub verified: bool,
    pub fallback: bool,
    /// Same value as `fallback`; kept for UI clients that read it
    pub test_mode: bool,
    pub message: String,
    pub notification: Notification,
    /// Failure summary for fallback outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured failure for fallback outcomes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<FailureDetails>,
}

/// Where and how a real dispatch failed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct FailureDetails {
    /// Pipeline stage that failed
    #[schema(example = "broadcasting")]
    pub stage: String,
    /// Provider JSON-RPC error code, when one was returned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    pub message: String,
}

impl RewardResponse {
    #[must_use]
    pub fn from_outcome(outcome: &TransactionOutcome, recipient: &Address, label: &str) -> Self {
        match outcome {
            TransactionOutcome::Sent { hash, verified } => {
                let message = if *verified {
                    format!("Successfully sent {} to {}", label, recipient)
                } else {
                    format!(
                        "Successfully sent {} to {} (awaiting network confirmation)",
                        label, recipient
                    )
                };
                Self {
                    success: true,
                    transaction_hash: hash.to_string(),
                    verified: *verified,
                    fallback: false,
                    test_mode: false,
                    message,
                    notification: Notification::sent(label, hash, *verified),
                    error: None,
                    error_details: None,
                }
            }
            TransactionOutcome::Fallback {
                placeholder,
                reason,
            } => {
                let (message, error, error_details) = match reason {
                    FallbackReason::Simulated => (
                        format!("SIMULATED MODE: Simulated sending {} to {}", label, recipient),
                        None,
                        None,
                    ),
                    FallbackReason::Failed {
                        stage,
                        message,
                        code,
                    } => (
                        format!("FALLBACK MODE: Simulated sending {} to {}", label, recipient),
                        Some(message.clone()),
                        Some(FailureDetails {
                            stage: stage.to_string(),
                            code: *code,
                            message: message.clone(),
                        }),
                    ),
                };
                Self {
                    success: true,
                    transaction_hash: placeholder.to_string(),
                    verified: false,
                    fallback: true,
                    test_mode: true,
                    message,
                    notification: Notification {
                        title: "Reward Queued".to_string(),
                        body: format!("Your {} reward was recorded in simulated mode.", label),
                    },
                    error,
                    error_details,
                }
            }
        }
    }
}

/// Health status enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some systems degraded but functional
    Degraded,
    /// Critical systems unavailable
    Unhealthy,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall system status
    pub status: HealthStatus,
    /// RPC pool health (any endpoint answering counts)
    pub rpc: HealthStatus,
    /// Whether a treasury key is present (its validity is checked per claim)
    pub treasury_configured: bool,
    pub mode: DispatchMode,
    /// Number of configured RPC endpoints
    pub endpoints: usize,
    /// Current server timestamp
    pub timestamp: DateTime<Utc>,
    /// Application version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl HealthResponse {
    #[must_use]
    pub fn new(
        rpc: HealthStatus,
        treasury_configured: bool,
        mode: DispatchMode,
        endpoints: usize,
    ) -> Self {
        let status = match (mode, rpc, treasury_configured) {
            (DispatchMode::Simulated, _, _) => HealthStatus::Degraded,
            (_, HealthStatus::Unhealthy, _) => HealthStatus::Unhealthy,
            (_, HealthStatus::Healthy, true) => HealthStatus::Healthy,
            _ => HealthStatus::Degraded,
        };
        Self {
            status,
            rpc,
            treasury_configured,
            mode,
            endpoints,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error response structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// Error details
    pub error: ErrorDetail,
}

/// Error detail structure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Error type identifier
    #[schema(example = "configuration_error")]
    pub r#type: String,
    /// Human-readable error message
    #[schema(example = "Configuration error: Treasury private key not configured")]
    pub message: String,
}

/// Rate limit exceeded response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RateLimitResponse {
    /// Error details
    pub error: ErrorDetail,
    /// Seconds until rate limit resets
    #[schema(example = 1)]
    pub retry_after: u64,
}
