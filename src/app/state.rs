//! Application state management.

use std::sync::Arc;

use secrecy::SecretString;

use crate::domain::RpcTransport;
use crate::infra::blockchain::{EndpointPool, FailoverCaller};

use super::dispatcher::{DispatcherConfig, RewardDispatcher};
use super::service::AppService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
}

impl AppState {
    /// Wire the dispatch pipeline over `transport` and `pool`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        pool: EndpointPool,
        treasury_key: Option<SecretString>,
        config: DispatcherConfig,
    ) -> Self {
        let caller = Arc::new(FailoverCaller::new(transport, Arc::new(pool)));
        let dispatcher = Arc::new(RewardDispatcher::new(
            Arc::clone(&caller),
            treasury_key,
            config,
        ));
        Self::with_service(AppService::new(dispatcher, caller))
    }

    #[must_use]
    pub fn with_service(service: AppService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}
