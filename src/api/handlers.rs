//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use utoipa::OpenApi;

use crate::app::AppState;
use crate::domain::{
    AppError, DispatchMode, ErrorDetail, ErrorResponse, FailureDetails, HealthResponse,
    HealthStatus, Notification, RateLimitResponse, RewardRequest, RewardResponse,
    ValidationError,
};

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Reward Relayer API",
        version = "0.1.0",
        description = "Pays a fixed on-chain reward to a player's wallet, degrading to a flagged simulated result when no RPC provider can take the transaction",
        license(
            name = "MIT"
        )
    ),
    paths(
        claim_reward_handler,
        health_check_handler,
        liveness_handler,
        readiness_handler,
    ),
    components(
        schemas(
            RewardRequest,
            RewardResponse,
            FailureDetails,
            Notification,
            DispatchMode,
            HealthResponse,
            HealthStatus,
            ErrorResponse,
            ErrorDetail,
            RateLimitResponse,
        )
    ),
    tags(
        (name = "rewards", description = "Reward claim endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Claim the fixed reward for a wallet
///
/// Signs and broadcasts a `sendReward(recipient)` call from the treasury.
/// When every RPC provider fails the response is still 200, with
/// `fallback: true` and a placeholder hash.
///
/// **Check `fallback`, not the status code, to know whether a real
/// transfer happened.**
#[utoipa::path(
    post,
    path = "/reward",
    tag = "rewards",
    request_body = RewardRequest,
    responses(
        (status = 200, description = "Reward sent, or recorded as a flagged fallback", body = RewardResponse),
        (status = 400, description = "Missing or malformed recipient", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse),
        (status = 500, description = "Treasury not configured or internal error", body = ErrorResponse)
    )
)]
pub async fn claim_reward_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RewardRequest>, JsonRejection>,
) -> Result<Json<RewardResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected claim body");
        ValidationError::InvalidBody(rejection.body_text())
    })?;
    let response = state.service.claim_reward(&payload).await?;
    Ok(Json(response))
}

/// Detailed health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Application is ready to serve traffic"),
        (status = 503, description = "No RPC endpoint is answering")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Serve the OpenAPI document
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
