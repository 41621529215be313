//! Application entry point.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use secrecy::SecretString;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use reward_relayer::api::{RateLimitConfig, RouterConfig, create_router_with_config};
use reward_relayer::app::AppState;
use reward_relayer::app::dispatcher::{
    DEFAULT_CHAIN_ID, DEFAULT_GAS_LIMIT, DEFAULT_REWARD_LABEL, DEFAULT_REWARDS_CONTRACT,
    DispatcherConfig,
};
use reward_relayer::domain::DispatchMode;
use reward_relayer::infra::blockchain::{
    EndpointPool, GasMargin, HttpRpcClient, KeyMetadata, RpcClientConfig, TreasurySigner,
};

/// Application configuration
struct Config {
    pool: EndpointPool,
    /// Absent is allowed at startup; claims then fail with a configuration error
    treasury_key: Option<SecretString>,
    dispatcher: DispatcherConfig,
    rpc_timeout: Duration,
    host: String,
    port: u16,
    enable_rate_limiting: bool,
    rate_limit_config: RateLimitConfig,
    cors_allowed_origins: Vec<String>,
}

impl Config {
    fn from_env() -> Result<Self> {
        let rpc_urls = env::var("RPC_URLS").context("RPC_URLS environment variable is not set")?;
        let pool = EndpointPool::from_csv(&rpc_urls).context("Invalid RPC_URLS")?;

        let treasury_key = env::var("TREASURY_PRIVATE_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let contract = match env::var("REWARDS_CONTRACT_ADDRESS") {
            Ok(raw) if !raw.trim().is_empty() => Address::from_str(raw.trim())
                .with_context(|| format!("Invalid REWARDS_CONTRACT_ADDRESS: {}", raw))?,
            _ => DEFAULT_REWARDS_CONTRACT,
        };

        let mode = match env::var("DISPATCH_MODE") {
            Ok(raw) => DispatchMode::from_str(&raw).map_err(anyhow::Error::msg)?,
            Err(_) => DispatchMode::Real,
        };

        let multiplier: f64 = parse_env("GAS_PRICE_MULTIPLIER", 1.1)?;
        let gas_margin = GasMargin::from_multiplier(multiplier)?;

        let verify_propagation = env::var("VERIFY_PROPAGATION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);
        let propagation_delay_ms: u64 = parse_env("PROPAGATION_DELAY_MS", 2000)?;

        let dispatcher = DispatcherConfig {
            mode,
            contract,
            chain_id: parse_env("CHAIN_ID", DEFAULT_CHAIN_ID)?,
            gas_limit: parse_env("GAS_LIMIT", DEFAULT_GAS_LIMIT)?,
            gas_margin,
            verify_delay: verify_propagation.then(|| Duration::from_millis(propagation_delay_ms)),
            reward_label: env::var("REWARD_LABEL")
                .ok()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REWARD_LABEL.to_string()),
            ..DispatcherConfig::default()
        };

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);
        let enable_rate_limiting = env::var("ENABLE_RATE_LIMITING")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            pool,
            treasury_key,
            dispatcher,
            rpc_timeout: Duration::from_secs(parse_env("RPC_TIMEOUT_SECS", 10)?),
            host,
            port,
            enable_rate_limiting,
            rate_limit_config: RateLimitConfig::from_env(),
            cors_allowed_origins,
        })
    }

    /// Log key availability and shape only; a malformed key is reported per
    /// claim as a configuration error.
    fn check_treasury_key(&self) {
        let meta = KeyMetadata::inspect(self.treasury_key.as_ref());
        info!(
            present = meta.present,
            has_0x_prefix = meta.has_0x_prefix,
            length = meta.length,
            "Treasury key check"
        );
        if self.dispatcher.mode == DispatchMode::Simulated {
            return;
        }
        match TreasurySigner::from_secret(self.treasury_key.as_ref()) {
            Ok(signer) => info!(treasury = %signer.address(), "Treasury account loaded"),
            Err(e) => warn!(error = %e, "Reward claims will fail until the treasury key is fixed"),
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        _ => Ok(default),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    info!("Reward Relayer v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    info!(
        endpoints = config.pool.len(),
        primary = %config.pool.primary().label(),
        mode = %config.dispatcher.mode,
        chain_id = config.dispatcher.chain_id,
        contract = %config.dispatcher.contract,
        gas_multiplier = config.dispatcher.gas_margin.multiplier(),
        "Configuration loaded"
    );
    config.check_treasury_key();

    let transport = HttpRpcClient::new(RpcClientConfig {
        timeout: config.rpc_timeout,
    })?;
    let app_state = Arc::new(AppState::new(
        Arc::new(transport),
        config.pool,
        config.treasury_key,
        config.dispatcher,
    ));

    if config.enable_rate_limiting {
        info!(
            rps = config.rate_limit_config.requests_per_second.get(),
            burst = config.rate_limit_config.burst_size.get(),
            "Rate limiting enabled"
        );
    } else {
        info!("Rate limiting disabled");
    }
    let router = create_router_with_config(
        app_state,
        RouterConfig {
            rate_limit: config
                .enable_rate_limiting
                .then_some(config.rate_limit_config),
            cors_allowed_origins: config.cors_allowed_origins,
        },
    );

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server starting on http://{}", addr);
    info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
