//! The API layer, containing web handlers and routing.

pub mod handlers;
pub mod router;

pub use handlers::ApiDoc;
pub use router::{
    RateLimitConfig, RouterConfig, create_router, create_router_with_config,
    create_router_with_rate_limit,
};
