//! Fan-out of wallet events to per-wallet and global subscribers.

pub mod bus;
pub mod envelope;
pub mod event;

pub use bus::{
    WalletEventBus, WalletEventBusConfig, WalletSubscription, DEFAULT_GLOBAL_BUFFER_CAPACITY,
    DEFAULT_WALLET_BUFFER_CAPACITY,
};
pub use envelope::WalletEventEnvelope;
pub use event::WalletEvent;
