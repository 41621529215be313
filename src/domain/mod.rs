//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AppError, ConfigError, DispatchError, RpcError, RpcErrorKind, ValidationError,
};
pub use traits::RpcTransport;
pub use types::{
    DispatchMode, DispatchStage, Endpoint, ErrorDetail, ErrorResponse, FailureDetails,
    FallbackReason, HealthResponse, HealthStatus, Notification, PlaceholderHash, RateLimitResponse,
    RewardRequest, RewardResponse, RpcRequest, TransactionOutcome, parse_recipient,
};
