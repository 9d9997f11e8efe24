//! Session-level entry point for driving the wallet binary: typed commands
//! in, typed results and cached snapshots out.

mod engine;
mod facade;
mod session;

pub use facade::WalletOrchestrator;
pub use wallet_cache::WalletSnapshot;
pub use wallet_eventbus::{WalletEvent, WalletEventEnvelope, WalletSubscription};
