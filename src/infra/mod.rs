//! Infrastructure layer implementations.

pub mod blockchain;

pub use blockchain::{
    Broadcaster, EndpointPool, FailoverCaller, GasMargin, GasPricer, HttpRpcClient,
    NonceResolver, RpcClientConfig, TransactionBuilder, TreasurySigner,
};
