//! Error taxonomy for the reward relayer.
//!
//! Per-call RPC failures are classified once, where they happen, into
//! transport/protocol and transient/permanent. Everything above the RPC
//! client reads that classification instead of re-inspecting message text.

use thiserror::Error;

use super::types::DispatchStage;

/// Which side of the wire an RPC call failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Endpoint unreachable, timed out, or answered with a non-2xx status.
    Transport,
    /// Endpoint answered, but with an RPC-level error or an unusable result.
    Protocol,
}

/// Failure of a JSON-RPC call against one endpoint, or against a whole pool.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport failure at {endpoint}: {message}")]
    Transport {
        endpoint: String,
        message: String,
        transient: bool,
    },

    #[error("{} at {endpoint}: {message}", describe_code(.code))]
    Protocol {
        endpoint: String,
        code: Option<i64>,
        message: String,
        transient: bool,
    },

    #[error("all {attempts} endpoint(s) failed for {method}; last error: {last}")]
    Exhausted {
        method: String,
        attempts: usize,
        last: Box<RpcError>,
    },
}

fn describe_code(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!("rpc error {code}"),
        None => "bad rpc response".to_string(),
    }
}

impl RpcError {
    /// Transport/protocol classification. Aggregates report their last failure.
    #[must_use]
    pub fn kind(&self) -> RpcErrorKind {
        match self {
            Self::Transport { .. } => RpcErrorKind::Transport,
            Self::Protocol { .. } => RpcErrorKind::Protocol,
            Self::Exhausted { last, .. } => last.kind(),
        }
    }

    /// Whether the failure is worth one more end-to-end attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } | Self::Protocol { transient, .. } => *transient,
            Self::Exhausted { last, .. } => last.is_transient(),
        }
    }

    /// Provider-reported JSON-RPC code of the innermost failure.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self.last_failure() {
            Self::Protocol { code, .. } => *code,
            _ => None,
        }
    }

    /// The innermost single-endpoint failure.
    #[must_use]
    pub fn last_failure(&self) -> &RpcError {
        match self {
            Self::Exhausted { last, .. } => last.last_failure(),
            other => other,
        }
    }
}

/// A reward dispatch that could not complete at some pipeline stage.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{stage} failed: {source}")]
    Rpc {
        stage: DispatchStage,
        #[source]
        source: RpcError,
    },

    #[error("{stage} failed: {message}")]
    Rejected {
        stage: DispatchStage,
        message: String,
    },
}

impl DispatchError {
    #[must_use]
    pub fn rpc(stage: DispatchStage, source: RpcError) -> Self {
        Self::Rpc { stage, source }
    }

    #[must_use]
    pub fn rejected(stage: DispatchStage, message: impl Into<String>) -> Self {
        Self::Rejected {
            stage,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn stage(&self) -> DispatchStage {
        match self {
            Self::Rpc { stage, .. } | Self::Rejected { stage, .. } => *stage,
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rpc { source, .. } => source.is_transient(),
            Self::Rejected { .. } => false,
        }
    }

    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Rpc { source, .. } => source.code(),
            Self::Rejected { .. } => None,
        }
    }
}

/// Configuration errors. Never recovered from; surfaced as 500 per request or
/// as a startup failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Treasury private key not configured")]
    MissingSigningKey,

    #[error("Treasury private key is malformed: {0}")]
    InvalidSigningKey(&'static str),

    #[error("RPC endpoint pool is empty")]
    EmptyEndpointPool,

    #[error("Invalid RPC endpoint #{index}: {reason}")]
    InvalidEndpoint { index: usize, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
}

/// Caller input errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Recipient address is required")]
    MissingRecipient,

    #[error("Invalid recipient address: {0}")]
    InvalidRecipient(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("{0}")]
    Multiple(String),
}

/// Application-level error returned by services and handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Rate limit exceeded")]
    RateLimited,
}
