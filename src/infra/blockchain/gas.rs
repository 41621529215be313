//! Gas pricing with a fixed inflation margin.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};

use crate::domain::{ConfigError, RpcError};

use super::failover::FailoverCaller;
use super::rpc::parse_quantity;

const GAS_PRICE_REQUEST_ID: u64 = 3;

/// Margin in basis points: 10_000 is 1.0x.
const BPS_DENOMINATOR: u128 = 10_000;
/// Accepted margins: 1.1x to 1.2x.
const MIN_BPS: u32 = 11_000;
const MAX_BPS: u32 = 12_000;

/// Inflation factor applied to the network quote, stored in basis points so
/// the priced value is exact integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMargin {
    bps: u32,
}

impl GasMargin {
    /// 10% over the network quote.
    pub const DEFAULT: Self = Self { bps: 11_000 };

    /// Accepts multipliers in `[1.1, 1.2]`, compared at basis-point precision.
    pub fn from_multiplier(multiplier: f64) -> Result<Self, ConfigError> {
        let scaled = (multiplier * BPS_DENOMINATOR as f64).round();
        if !scaled.is_finite() || !(f64::from(MIN_BPS)..=f64::from(MAX_BPS)).contains(&scaled) {
            return Err(ConfigError::InvalidValue {
                name: "GAS_PRICE_MULTIPLIER",
                reason: format!("{} is outside [1.1, 1.2]", multiplier),
            });
        }
        Ok(Self { bps: scaled as u32 })
    }

    pub fn multiplier(&self) -> f64 {
        f64::from(self.bps) / BPS_DENOMINATOR as f64
    }

    /// `floor(base * multiplier)`, never below `base`.
    pub fn apply(&self, base: u128) -> u128 {
        let priced = base
            .checked_mul(u128::from(self.bps))
            .map(|scaled| scaled / BPS_DENOMINATOR)
            .unwrap_or(base);
        priced.max(base)
    }
}

impl Default for GasMargin {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Network quote and the price actually used for broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub base: u128,
    pub priced: u128,
}

/// Fetches `eth_gasPrice` and applies the margin.
pub struct GasPricer {
    caller: Arc<FailoverCaller>,
    margin: GasMargin,
}

impl GasPricer {
    #[must_use]
    pub fn new(caller: Arc<FailoverCaller>, margin: GasMargin) -> Self {
        Self { caller, margin }
    }

    /// A zero quote is treated as an unusable answer from that endpoint.
    #[instrument(skip(self))]
    pub async fn price(&self) -> Result<GasQuote, RpcError> {
        let base = self
            .caller
            .call_with("eth_gasPrice", json!([]), GAS_PRICE_REQUEST_ID, |value| {
                match parse_quantity(&value)? {
                    0 => Err("provider quoted a zero gas price".to_string()),
                    price => Ok(price),
                }
            })
            .await?;

        let priced = self.margin.apply(base);
        info!(
            base_gas_price = base,
            gas_price = priced,
            multiplier = self.margin.multiplier(),
            "Gas price resolved"
        );
        Ok(GasQuote { base, priced })
    }
}
