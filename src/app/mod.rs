//! Application layer containing business logic and shared state.

pub mod dispatcher;
pub mod service;
pub mod state;

pub use dispatcher::{DispatcherConfig, RewardDispatcher};
pub use service::AppService;
pub use state::AppState;
