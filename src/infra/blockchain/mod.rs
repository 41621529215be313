//! EVM client implementations.
//!
//! This module provides the JSON-RPC transport, ordered endpoint failover and
//! the reward pipeline stages built on top of it: nonce resolution, gas
//! pricing, transaction signing and broadcast.

pub mod broadcaster;
pub mod failover;
pub mod gas;
pub mod nonce;
pub mod pool;
pub mod rpc;
pub mod transaction;

// Re-export transport types
pub use failover::FailoverCaller;
pub use pool::EndpointPool;
pub use rpc::{HttpRpcClient, RpcClientConfig, parse_quantity};

// Re-export pipeline stages
pub use broadcaster::Broadcaster;
pub use gas::{GasMargin, GasPricer, GasQuote};
pub use nonce::NonceResolver;
pub use transaction::{
    KeyMetadata, SignedTransaction, TransactionBuilder, TreasurySigner, UnsignedTransaction,
    encode_reward_call,
};
