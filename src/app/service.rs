//! Application service layer with graceful degradation.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};
use validator::Validate;

use crate::domain::{
    AppError, HealthResponse, HealthStatus, RewardRequest, RewardResponse, ValidationError,
};
use crate::infra::blockchain::FailoverCaller;

use super::dispatcher::RewardDispatcher;

const HEALTH_REQUEST_ID: u64 = 1;

/// Application service containing business logic
pub struct AppService {
    dispatcher: Arc<RewardDispatcher>,
    caller: Arc<FailoverCaller>,
}

impl AppService {
    #[must_use]
    pub fn new(dispatcher: Arc<RewardDispatcher>, caller: Arc<FailoverCaller>) -> Self {
        Self { dispatcher, caller }
    }

    pub fn dispatcher(&self) -> &RewardDispatcher {
        &self.dispatcher
    }

    /// Validate a claim and pay it out.
    ///
    /// Pipeline failures come back as a 200-shaped fallback response; only
    /// validation and configuration problems are returned as errors.
    #[instrument(skip(self, request))]
    pub async fn claim_reward(&self, request: &RewardRequest) -> Result<RewardResponse, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;
        let recipient = request
            .recipient
            .as_deref()
            .ok_or(ValidationError::MissingRecipient)?;

        let (recipient, outcome) = self.dispatcher.dispatch(recipient).await?;
        let response =
            RewardResponse::from_outcome(&outcome, &recipient, self.dispatcher.reward_label());

        info!(
            recipient = %recipient,
            fallback = response.fallback,
            verified = response.verified,
            "Reward claim processed"
        );
        Ok(response)
    }

    /// Perform health check on the RPC pool and report configuration state
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let rpc = match self
            .caller
            .call_quantity("eth_blockNumber", json!([]), HEALTH_REQUEST_ID)
            .await
        {
            Ok(block) => {
                debug!(block = block, "RPC pool reachable");
                HealthStatus::Healthy
            }
            Err(e) => {
                warn!(error = %e, "RPC pool unreachable");
                HealthStatus::Unhealthy
            }
        };
        HealthResponse::new(
            rpc,
            self.dispatcher.treasury_configured(),
            self.dispatcher.mode(),
            self.caller.pool().len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::dispatcher::DispatcherConfig;
    use crate::domain::DispatchMode;
    use crate::infra::blockchain::EndpointPool;
    use crate::test_utils::{MockReply, MockTransport};
    use secrecy::SecretString;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RPC: &str = "http://rpc.test";

    fn service(transport: MockTransport, key: Option<&str>, mode: DispatchMode) -> AppService {
        let pool = EndpointPool::new([RPC]).unwrap();
        let caller = Arc::new(FailoverCaller::new(Arc::new(transport), Arc::new(pool)));
        let config = DispatcherConfig {
            mode,
            ..DispatcherConfig::default()
        };
        let key = key.map(|k| SecretString::from(k.to_string()));
        let dispatcher = Arc::new(RewardDispatcher::new(Arc::clone(&caller), key, config));
        AppService::new(dispatcher, caller)
    }

    #[tokio::test]
    async fn test_missing_recipient_is_validation_error() {
        let service = service(MockTransport::new(), Some(DEV_KEY), DispatchMode::Real);

        let err = service
            .claim_reward(&RewardRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .claim_reward(&RewardRequest::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_simulated_claim_is_flagged() {
        let service = service(MockTransport::new(), None, DispatchMode::Simulated);
        let response = service
            .claim_reward(&RewardRequest::new(
                "0x71C7656EC7ab88b098defB751B7401B5f6d8976F",
            ))
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.fallback);
        assert!(response.test_mode);
        assert!(response.message.starts_with("SIMULATED MODE"));
    }

    #[tokio::test]
    async fn test_health_reports_rpc_and_key_state() {
        let healthy = service(
            MockTransport::new().reply(RPC, "eth_blockNumber", MockReply::ok(json!("0x10"))),
            Some(DEV_KEY),
            DispatchMode::Real,
        )
        .health_check()
        .await;
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert!(healthy.treasury_configured);
        assert_eq!(healthy.endpoints, 1);

        let down = service(MockTransport::new(), Some(DEV_KEY), DispatchMode::Real)
            .health_check()
            .await;
        assert_eq!(down.rpc, HealthStatus::Unhealthy);
        assert_eq!(down.status, HealthStatus::Unhealthy);
    }
}
