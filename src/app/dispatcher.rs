//! Reward dispatch pipeline.
//!
//! One dispatch walks `ResolvingNonce -> PricingGas -> Building ->
//! Broadcasting -> Verifying -> Done`. Any stage failure moves straight to
//! `Fallback`, after at most one end-to-end retry for transient failures.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, address};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    AppError, DispatchError, DispatchMode, DispatchStage, FallbackReason, PlaceholderHash,
    TransactionOutcome, parse_recipient,
};
use crate::infra::blockchain::{
    Broadcaster, FailoverCaller, GasMargin, GasPricer, NonceResolver, TransactionBuilder,
    TreasurySigner,
};

/// Rewards contract on Base mainnet.
pub const DEFAULT_REWARDS_CONTRACT: Address =
    address!("6A27A08A1c43B995E483C9304a992B8dDDB7D41c");

/// Base mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 8453;

/// Comfortably above what `sendReward` costs.
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;

pub const DEFAULT_REWARD_LABEL: &str = "0.002 USDC";

/// Dispatcher settings, fixed at startup.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub mode: DispatchMode,
    pub contract: Address,
    pub chain_id: u64,
    pub gas_limit: u64,
    pub gas_margin: GasMargin,
    /// Delay before the propagation lookup; `None` skips verification.
    pub verify_delay: Option<Duration>,
    /// Pause before the single retry of a transient failure.
    pub retry_delay: Duration,
    /// Human label of the fixed, contract-enforced reward amount.
    pub reward_label: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Real,
            contract: DEFAULT_REWARDS_CONTRACT,
            chain_id: DEFAULT_CHAIN_ID,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_margin: GasMargin::DEFAULT,
            verify_delay: Some(Duration::from_secs(2)),
            retry_delay: Duration::from_millis(500),
            reward_label: DEFAULT_REWARD_LABEL.to_string(),
        }
    }
}

/// Orchestrates one reward payout per call and degrades to a flagged
/// fallback outcome instead of surfacing pipeline failures.
pub struct RewardDispatcher {
    config: DispatcherConfig,
    treasury_key: Option<SecretString>,
    nonces: NonceResolver,
    gas: GasPricer,
    builder: TransactionBuilder,
    broadcaster: Broadcaster,
    /// Last nonce this process broadcast. Held from nonce resolution until
    /// the broadcast returns, so concurrent claims never share a nonce.
    last_nonce: Mutex<Option<u64>>,
}

impl RewardDispatcher {
    #[must_use]
    pub fn new(
        caller: Arc<FailoverCaller>,
        treasury_key: Option<SecretString>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            nonces: NonceResolver::new(Arc::clone(&caller)),
            gas: GasPricer::new(Arc::clone(&caller), config.gas_margin),
            builder: TransactionBuilder::new(config.contract, config.chain_id, config.gas_limit),
            broadcaster: Broadcaster::new(caller, config.verify_delay),
            treasury_key,
            config,
            last_nonce: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.config.mode
    }

    pub fn reward_label(&self) -> &str {
        &self.config.reward_label
    }

    pub fn treasury_configured(&self) -> bool {
        self.treasury_key.is_some()
    }

    /// Pay the fixed reward to `recipient`.
    ///
    /// Returns `Err` only for configuration and input errors, both checked
    /// before any network call. Every pipeline failure becomes
    /// [`TransactionOutcome::Fallback`].
    #[instrument(skip(self), fields(mode = %self.config.mode))]
    pub async fn dispatch(
        &self,
        recipient: &str,
    ) -> Result<(Address, TransactionOutcome), AppError> {
        if self.config.mode == DispatchMode::Simulated {
            let recipient = parse_recipient(recipient)?;
            let placeholder = PlaceholderHash::random();
            info!(
                recipient = %recipient,
                placeholder_hash = %placeholder,
                "Simulated mode, no transaction sent"
            );
            return Ok((
                recipient,
                TransactionOutcome::Fallback {
                    placeholder,
                    reason: FallbackReason::Simulated,
                },
            ));
        }

        // Key material lives only for the duration of this dispatch.
        let signer = TreasurySigner::from_secret(self.treasury_key.as_ref())?;
        let recipient = parse_recipient(recipient)?;
        info!(recipient = %recipient, treasury = %signer.address(), "Dispatching reward");

        let outcome = match self.attempt(&signer, recipient).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_transient() => {
                warn!(
                    stage = %e.stage(),
                    error = %e,
                    "Transient failure, retrying dispatch once"
                );
                tokio::time::sleep(self.config.retry_delay).await;
                match self.attempt(&signer, recipient).await {
                    Ok(outcome) => outcome,
                    Err(e) => fallback(e),
                }
            }
            Err(e) => fallback(e),
        };
        Ok((recipient, outcome))
    }

    async fn attempt(
        &self,
        signer: &TreasurySigner,
        recipient: Address,
    ) -> Result<TransactionOutcome, DispatchError> {
        let mut stage = DispatchStage::ResolvingNonce;
        let mut last_nonce = self.last_nonce.lock().await;

        let mut nonce = self
            .nonces
            .resolve(signer.address())
            .await
            .map_err(|e| DispatchError::rpc(stage, e))?;
        if is_stale(nonce, *last_nonce) {
            debug!(
                nonce,
                last_broadcast = ?*last_nonce,
                "Chain nonce behind last broadcast, re-resolving"
            );
            tokio::time::sleep(self.config.retry_delay).await;
            nonce = self
                .nonces
                .resolve(signer.address())
                .await
                .map_err(|e| DispatchError::rpc(stage, e))?;
            if is_stale(nonce, *last_nonce) {
                warn!(
                    nonce,
                    last_broadcast = ?*last_nonce,
                    "Chain still reports a used nonce; an earlier broadcast may have been dropped"
                );
            }
        }
        advance(&mut stage);

        let quote = self
            .gas
            .price()
            .await
            .map_err(|e| DispatchError::rpc(stage, e))?;
        advance(&mut stage);

        let unsigned = self.builder.build(recipient, nonce, quote.priced);
        let signed = signer.sign(&unsigned)?;
        advance(&mut stage);

        let hash = self
            .broadcaster
            .submit(&signed)
            .await
            .map_err(|e| DispatchError::rpc(stage, e))?;
        *last_nonce = Some(nonce);
        drop(last_nonce);
        advance(&mut stage);

        let verified = self.broadcaster.confirm(hash).await;
        advance(&mut stage);

        info!(
            tx_hash = %hash,
            nonce,
            gas_price = quote.priced,
            verified,
            "Reward dispatched"
        );
        Ok(TransactionOutcome::Sent { hash, verified })
    }
}

fn advance(stage: &mut DispatchStage) {
    let next = stage.next();
    debug!(from = %stage, to = %next, "Dispatch stage complete");
    *stage = next;
}

fn fallback(err: DispatchError) -> TransactionOutcome {
    let placeholder = PlaceholderHash::random();
    error!(
        stage = %err.stage(),
        error = %err,
        placeholder_hash = %placeholder,
        "Dispatch failed, returning fallback outcome"
    );
    TransactionOutcome::Fallback {
        placeholder,
        reason: FallbackReason::Failed {
            stage: err.stage(),
            message: err.to_string(),
            code: err.code(),
        },
    }
}

/// The chain reports a nonce this process has already broadcast.
///
/// Only ever triggers a re-resolve; the nonce sent is always the one the
/// chain reported.
pub fn is_stale(resolved: u64, last_broadcast: Option<u64>) -> bool {
    last_broadcast.is_some_and(|last| resolved <= last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ConfigError;
    use crate::infra::blockchain::EndpointPool;
    use crate::test_utils::{MockReply, MockTransport, RecordedCall};
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;
    use serde_json::json;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const RECIPIENT: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";
    const TX_HASH: &str = "0x5c504ed432cb51138bcf09aa5e8a410dd4a1e204ef84bfed1be16dfba1b22060";
    const BAD: &str = "http://bad.test";
    const GOOD: &str = "http://good.test";

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            verify_delay: Some(Duration::from_millis(1)),
            retry_delay: Duration::ZERO,
            ..DispatcherConfig::default()
        }
    }

    fn dispatcher(transport: &Arc<MockTransport>, config: DispatcherConfig) -> RewardDispatcher {
        let pool = EndpointPool::new([BAD, GOOD]).unwrap();
        let caller = Arc::new(FailoverCaller::new(transport.clone(), Arc::new(pool)));
        RewardDispatcher::new(
            caller,
            Some(SecretString::from(DEV_KEY.to_string())),
            config,
        )
    }

    /// Primary endpoint down, backup healthy: pending=5, latest=4, gas=100.
    fn healthy_backup() -> MockTransport {
        MockTransport::new()
            .reply(BAD, "eth_getTransactionCount", MockReply::transport(true))
            .reply(BAD, "eth_gasPrice", MockReply::transport(true))
            .reply(BAD, "eth_sendRawTransaction", MockReply::transport(true))
            .reply(BAD, "eth_getTransactionByHash", MockReply::transport(true))
            .reply_matching(
                GOOD,
                "eth_getTransactionCount",
                "pending",
                MockReply::ok(json!("0x5")),
            )
            .reply_matching(
                GOOD,
                "eth_getTransactionCount",
                "latest",
                MockReply::ok(json!("0x4")),
            )
            .reply(GOOD, "eth_gasPrice", MockReply::ok(json!("0x64")))
            .reply(GOOD, "eth_sendRawTransaction", MockReply::ok(json!(TX_HASH)))
            .reply(
                GOOD,
                "eth_getTransactionByHash",
                MockReply::ok(json!({ "hash": TX_HASH })),
            )
    }

    fn broadcast_txs(transport: &MockTransport) -> Vec<TxEnvelope> {
        transport
            .calls_for("eth_sendRawTransaction")
            .iter()
            .filter(|call| call.endpoint == GOOD)
            .map(decode_raw)
            .collect()
    }

    fn decode_raw(call: &RecordedCall) -> TxEnvelope {
        let raw = alloy::hex::decode(call.params[0].as_str().unwrap()).unwrap();
        TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_through_backup_endpoint() {
        let transport = Arc::new(healthy_backup());
        let dispatcher = dispatcher(&transport, config());

        let (recipient, outcome) = dispatcher.dispatch(RECIPIENT).await.unwrap();
        assert_eq!(recipient, parse_recipient(RECIPIENT).unwrap());
        match outcome {
            TransactionOutcome::Sent { hash, verified } => {
                assert_eq!(hash.to_string(), TX_HASH);
                assert!(verified);
            }
            other => panic!("expected a real send, got {other:?}"),
        }

        let txs = broadcast_txs(&transport);
        assert_eq!(txs.len(), 1);
        let tx = txs[0].as_legacy().unwrap().tx();
        assert_eq!(tx.nonce, 5);
        assert_eq!(tx.gas_price, 110);
        assert_eq!(tx.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(tx.chain_id, Some(DEFAULT_CHAIN_ID));
    }

    #[tokio::test]
    async fn test_higher_margin_prices_at_120() {
        let transport = Arc::new(healthy_backup());
        let config = DispatcherConfig {
            gas_margin: GasMargin::from_multiplier(1.2).unwrap(),
            ..config()
        };

        dispatcher(&transport, config).dispatch(RECIPIENT).await.unwrap();
        let txs = broadcast_txs(&transport);
        assert_eq!(txs[0].as_legacy().unwrap().tx().gas_price, 120);
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_any_network_call() {
        let transport = Arc::new(healthy_backup());
        let pool = EndpointPool::new([BAD, GOOD]).unwrap();
        let caller = Arc::new(FailoverCaller::new(transport.clone(), Arc::new(pool)));
        let dispatcher = RewardDispatcher::new(caller, None, config());

        let err = dispatcher.dispatch(RECIPIENT).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::MissingSigningKey)
        ));
        assert_eq!(transport.call_count(), 0);
        assert!(!dispatcher.treasury_configured());
    }

    #[tokio::test]
    async fn test_invalid_recipient_fails_before_any_network_call() {
        let transport = Arc::new(healthy_backup());
        let err = dispatcher(&transport, config())
            .dispatch("0xnot-an-address")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_simulated_mode_never_touches_network() {
        let transport = Arc::new(MockTransport::new());
        let pool = EndpointPool::new([GOOD]).unwrap();
        let caller = Arc::new(FailoverCaller::new(transport.clone(), Arc::new(pool)));
        let config = DispatcherConfig {
            mode: DispatchMode::Simulated,
            ..config()
        };
        let dispatcher = RewardDispatcher::new(caller, None, config);

        let (_, outcome) = dispatcher.dispatch(RECIPIENT).await.unwrap();
        assert!(matches!(
            outcome,
            TransactionOutcome::Fallback {
                reason: FallbackReason::Simulated,
                ..
            }
        ));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_permanent_broadcast_failure_falls_back_without_retry() {
        let transport = Arc::new(
            MockTransport::new()
                .reply(GOOD, "eth_getTransactionCount", MockReply::ok(json!("0x1")))
                .reply(GOOD, "eth_gasPrice", MockReply::ok(json!("0x64")))
                .reply(
                    BAD,
                    "eth_sendRawTransaction",
                    MockReply::protocol(-32000, "insufficient funds for gas * price + value"),
                )
                .reply(
                    GOOD,
                    "eth_sendRawTransaction",
                    MockReply::protocol(-32000, "insufficient funds for gas * price + value"),
                ),
        );

        let (_, outcome) = dispatcher(&transport, config())
            .dispatch(RECIPIENT)
            .await
            .unwrap();
        match outcome {
            TransactionOutcome::Fallback {
                reason:
                    FallbackReason::Failed {
                        stage,
                        message,
                        code,
                    },
                placeholder,
            } => {
                assert_eq!(stage, DispatchStage::Broadcasting);
                assert_eq!(code, Some(-32000));
                assert!(message.contains("insufficient funds"));
                assert_eq!(placeholder.to_string().len(), 66);
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(transport.calls_for("eth_sendRawTransaction").len(), 2);
        assert!(transport.calls_for("eth_getTransactionByHash").is_empty());
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let transport = Arc::new(
            MockTransport::new()
                .reply_once(BAD, "eth_gasPrice", MockReply::transport(true))
                .reply_once(GOOD, "eth_gasPrice", MockReply::protocol(-32005, "rate limited"))
                .reply(BAD, "eth_gasPrice", MockReply::transport(true))
                .reply(GOOD, "eth_gasPrice", MockReply::ok(json!("0x64")))
                .reply(GOOD, "eth_getTransactionCount", MockReply::ok(json!("0x2")))
                .reply(GOOD, "eth_sendRawTransaction", MockReply::ok(json!(TX_HASH)))
                .reply(GOOD, "eth_getTransactionByHash", MockReply::ok(json!(null))),
        );

        let (_, outcome) = dispatcher(&transport, config())
            .dispatch(RECIPIENT)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransactionOutcome::Sent {
                verified: false,
                ..
            }
        ));
        assert_eq!(transport.calls_for("eth_gasPrice").len(), 4);
    }

    #[tokio::test]
    async fn test_transient_failure_twice_falls_back() {
        let transport = Arc::new(
            MockTransport::new()
                .reply(GOOD, "eth_getTransactionCount", MockReply::ok(json!("0x2")))
                .reply(BAD, "eth_gasPrice", MockReply::transport(true))
                .reply(GOOD, "eth_gasPrice", MockReply::transport(true)),
        );

        let (_, outcome) = dispatcher(&transport, config())
            .dispatch(RECIPIENT)
            .await
            .unwrap();
        match outcome {
            TransactionOutcome::Fallback {
                reason: FallbackReason::Failed { stage, .. },
                ..
            } => assert_eq!(stage, DispatchStage::PricingGas),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(transport.calls_for("eth_gasPrice").len(), 4);
        assert!(transport.calls_for("eth_sendRawTransaction").is_empty());
    }

    #[tokio::test]
    async fn test_nonce_failure_falls_back_at_first_stage() {
        let transport = Arc::new(MockTransport::new());
        let (_, outcome) = dispatcher(&transport, config())
            .dispatch(RECIPIENT)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransactionOutcome::Fallback {
                reason: FallbackReason::Failed {
                    stage: DispatchStage::ResolvingNonce,
                    ..
                },
                ..
            }
        ));
    }

    /// Every counted query is answered once, in order, so each dispatch sees
    /// the pending count advanced by the previous broadcast.
    fn advancing_counts(counts: &[&str]) -> MockTransport {
        counts
            .iter()
            .fold(MockTransport::new(), |mock, count| {
                mock.reply_once(GOOD, "eth_getTransactionCount", MockReply::ok(json!(count)))
                    .reply_once(GOOD, "eth_getTransactionCount", MockReply::ok(json!(count)))
            })
            .reply(GOOD, "eth_gasPrice", MockReply::ok(json!("0x64")))
            .reply(GOOD, "eth_sendRawTransaction", MockReply::ok(json!(TX_HASH)))
            .reply(GOOD, "eth_getTransactionByHash", MockReply::ok(json!(null)))
    }

    fn count_queries(transport: &MockTransport) -> usize {
        transport
            .calls_for("eth_getTransactionCount")
            .iter()
            .filter(|call| call.endpoint == GOOD)
            .count()
    }

    fn broadcast_nonces(transport: &MockTransport) -> Vec<u64> {
        broadcast_txs(transport)
            .iter()
            .map(|tx| tx.as_legacy().unwrap().tx().nonce)
            .collect()
    }

    #[tokio::test]
    async fn test_concurrent_dispatches_use_chain_nonces_in_turn() {
        let transport = Arc::new(advancing_counts(&["0x5", "0x6", "0x7"]));
        let dispatcher = Arc::new(dispatcher(&transport, config()));

        let (a, b, c) = tokio::join!(
            dispatcher.dispatch(RECIPIENT),
            dispatcher.dispatch(RECIPIENT),
            dispatcher.dispatch(RECIPIENT)
        );
        for result in [a, b, c] {
            assert!(!result.unwrap().1.is_fallback());
        }

        let mut nonces = broadcast_nonces(&transport);
        nonces.sort_unstable();
        assert_eq!(nonces, vec![5, 6, 7]);
        assert_eq!(count_queries(&transport), 6);
    }

    #[tokio::test]
    async fn test_dropped_broadcast_never_pushes_nonce_past_chain() {
        // Nothing the process broadcasts is ever counted by the chain.
        let transport = Arc::new(
            MockTransport::new()
                .reply(GOOD, "eth_getTransactionCount", MockReply::ok(json!("0x5")))
                .reply(GOOD, "eth_gasPrice", MockReply::ok(json!("0x64")))
                .reply(GOOD, "eth_sendRawTransaction", MockReply::ok(json!(TX_HASH)))
                .reply(GOOD, "eth_getTransactionByHash", MockReply::ok(json!(null))),
        );
        let dispatcher = dispatcher(&transport, config());

        for _ in 0..3 {
            let (_, outcome) = dispatcher.dispatch(RECIPIENT).await.unwrap();
            assert!(!outcome.is_fallback());
        }

        assert_eq!(broadcast_nonces(&transport), vec![5, 5, 5]);
        // First dispatch resolves once, later ones re-resolve once each.
        assert_eq!(count_queries(&transport), 2 + 4 + 4);
    }

    #[tokio::test]
    async fn test_caught_up_chain_skips_re_resolve() {
        let transport = Arc::new(advancing_counts(&["0x5", "0x5", "0x6"]));
        let dispatcher = dispatcher(&transport, config());

        dispatcher.dispatch(RECIPIENT).await.unwrap();
        dispatcher.dispatch(RECIPIENT).await.unwrap();

        // The second dispatch saw 5 again, re-resolved and got 6.
        assert_eq!(broadcast_nonces(&transport), vec![5, 6]);
        assert_eq!(count_queries(&transport), 6);
    }

    #[tokio::test]
    async fn test_verification_disabled_reports_unverified() {
        let transport = Arc::new(healthy_backup());
        let config = DispatcherConfig {
            verify_delay: None,
            ..config()
        };

        let (_, outcome) = dispatcher(&transport, config)
            .dispatch(RECIPIENT)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            TransactionOutcome::Sent {
                verified: false,
                ..
            }
        ));
        assert!(transport.calls_for("eth_getTransactionByHash").is_empty());
    }

    #[test]
    fn test_is_stale() {
        assert!(!is_stale(5, None));
        assert!(!is_stale(5, Some(4)));
        assert!(is_stale(5, Some(5)));
        assert!(is_stale(2, Some(9)));
    }
}
