use wallet_protocol::WalletId;

use crate::event::WalletEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletEventEnvelope {
    pub wallet: WalletId,
    pub sequence: u64,
    pub published_at_monotonic_nanos: u64,
    pub event: WalletEvent,
}
