//! Reward relayer: pays a fixed on-chain reward to a player's wallet through an
//! ordered pool of JSON-RPC providers, and degrades to an explicitly flagged
//! simulated result when no provider can take the transaction.

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
