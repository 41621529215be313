//! Router construction, middleware stack and rate limiting.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use governor::{
    DefaultDirectRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::domain::{ErrorDetail, RateLimitResponse};

use super::handlers::{
    claim_reward_handler, health_check_handler, liveness_handler, openapi_handler,
    readiness_handler,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 16 * 1024;
const DEFAULT_RPS: NonZeroU32 = NonZeroU32::new(5).unwrap();
const DEFAULT_BURST: NonZeroU32 = NonZeroU32::new(10).unwrap();

/// Global token-bucket limit on reward claims
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub burst_size: NonZeroU32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: DEFAULT_RPS,
            burst_size: DEFAULT_BURST,
        }
    }
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_RPS` and `RATE_LIMIT_BURST`; zero or unparsable
    /// values keep the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_second: read_non_zero("RATE_LIMIT_RPS")
                .unwrap_or(defaults.requests_per_second),
            burst_size: read_non_zero("RATE_LIMIT_BURST").unwrap_or(defaults.burst_size),
        }
    }

    fn limiter(&self) -> DefaultDirectRateLimiter {
        RateLimiter::direct(
            Quota::per_second(self.requests_per_second).allow_burst(self.burst_size),
        )
    }
}

fn read_non_zero(name: &str) -> Option<NonZeroU32> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .and_then(NonZeroU32::new)
}

/// Router options beyond the application state
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    pub rate_limit: Option<RateLimitConfig>,
    /// Allowed CORS origins; empty or `*` allows any origin
    pub cors_allowed_origins: Vec<String>,
}

/// Create the router without rate limiting and with permissive CORS
pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with_config(state, RouterConfig::default())
}

/// Create the router with the claim rate limiter enabled
pub fn create_router_with_rate_limit(state: Arc<AppState>, rate_limit: RateLimitConfig) -> Router {
    create_router_with_config(
        state,
        RouterConfig {
            rate_limit: Some(rate_limit),
            ..RouterConfig::default()
        },
    )
}

pub fn create_router_with_config(state: Arc<AppState>, config: RouterConfig) -> Router {
    let mut claims = Router::new()
        .route("/reward", post(claim_reward_handler))
        .route("/api/send-reward", post(claim_reward_handler));

    if let Some(rate_limit) = config.rate_limit {
        let limiter = Arc::new(rate_limit.limiter());
        claims = claims.route_layer(middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    Router::new()
        .merge(claims)
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(cors_layer(&config.cors_allowed_origins)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(allowed))
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            let retry_after = wait.as_secs().max(1);
            warn!(retry_after, path = %request.uri().path(), "Rate limit exceeded");

            let body = Json(RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Too many reward claims, slow down".to_string(),
                },
                retry_after,
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.to_string())],
                body,
            )
                .into_response()
        }
    }
}
