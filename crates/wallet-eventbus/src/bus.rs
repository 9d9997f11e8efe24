use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::broadcast;
use wallet_protocol::WalletId;

use crate::envelope::WalletEventEnvelope;
use crate::event::WalletEvent;

pub const DEFAULT_WALLET_BUFFER_CAPACITY: usize = 64;
pub const DEFAULT_GLOBAL_BUFFER_CAPACITY: usize = 256;

/// Channel sizes. A subscriber that falls further behind than its buffer
/// sees `RecvError::Lagged`. Zero is raised to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletEventBusConfig {
    pub wallet_buffer_capacity: usize,
    pub global_buffer_capacity: usize,
}

impl Default for WalletEventBusConfig {
    fn default() -> Self {
        Self {
            wallet_buffer_capacity: DEFAULT_WALLET_BUFFER_CAPACITY,
            global_buffer_capacity: DEFAULT_GLOBAL_BUFFER_CAPACITY,
        }
    }
}

/// A wallet subscription that starts from the most recent snapshot event,
/// if one was published, followed by every event after it.
#[derive(Debug)]
pub struct WalletSubscription {
    pub latest: Option<WalletEventEnvelope>,
    pub events: broadcast::Receiver<WalletEventEnvelope>,
}

#[derive(Debug)]
struct WalletChannel {
    sender: broadcast::Sender<WalletEventEnvelope>,
    latest_snapshot: Option<WalletEventEnvelope>,
}

#[derive(Debug, Default)]
struct BusState {
    last_sequence: u64,
    wallets: HashMap<WalletId, WalletChannel>,
}

/// Publishing and subscribing share one lock, so delivery order matches
/// sequence order and a `WalletSubscription` neither repeats nor misses an
/// event between `latest` and `events`.
#[derive(Debug)]
pub struct WalletEventBus {
    boot_instant: Instant,
    wallet_capacity: usize,
    global_sender: broadcast::Sender<WalletEventEnvelope>,
    state: Mutex<BusState>,
}

impl Default for WalletEventBus {
    fn default() -> Self {
        Self::new(WalletEventBusConfig::default())
    }
}

impl WalletEventBus {
    pub fn new(config: WalletEventBusConfig) -> Self {
        let (global_sender, _global_receiver) =
            broadcast::channel(config.global_buffer_capacity.max(1));
        Self {
            boot_instant: Instant::now(),
            wallet_capacity: config.wallet_buffer_capacity.max(1),
            global_sender,
            state: Mutex::new(BusState::default()),
        }
    }

    pub fn subscribe_wallet(&self, wallet: WalletId) -> broadcast::Receiver<WalletEventEnvelope> {
        self.subscribe_wallet_with_latest(wallet).events
    }

    pub fn subscribe_wallet_with_latest(&self, wallet: WalletId) -> WalletSubscription {
        let mut state = self.lock_state();
        let channel = channel_for(&mut state.wallets, wallet, self.wallet_capacity);
        WalletSubscription {
            latest: channel.latest_snapshot.clone(),
            events: channel.sender.subscribe(),
        }
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<WalletEventEnvelope> {
        self.global_sender.subscribe()
    }

    pub fn publish(&self, wallet: WalletId, event: WalletEvent) -> WalletEventEnvelope {
        let mut state = self.lock_state();
        let envelope = self.envelope(&mut state, wallet, event);

        let channel = if matches!(envelope.event, WalletEvent::SnapshotChanged { .. }) {
            let channel =
                channel_for(&mut state.wallets, envelope.wallet.clone(), self.wallet_capacity);
            channel.latest_snapshot = Some(envelope.clone());
            Some(channel)
        } else {
            state.wallets.get_mut(&envelope.wallet)
        };
        if let Some(channel) = channel {
            send(&channel.sender, &envelope);
        }
        send(&self.global_sender, &envelope);

        envelope
    }

    /// Publishes `SessionClosed` and drops the wallet's channel along with
    /// its remembered snapshot. Wallet subscribers receive the event, then
    /// `Closed`.
    pub fn close_wallet(&self, wallet: &WalletId) -> WalletEventEnvelope {
        let mut state = self.lock_state();
        let envelope = self.envelope(&mut state, wallet.clone(), WalletEvent::SessionClosed);
        if let Some(channel) = state.wallets.remove(wallet) {
            send(&channel.sender, &envelope);
        }
        send(&self.global_sender, &envelope);
        envelope
    }

    fn envelope(
        &self,
        state: &mut BusState,
        wallet: WalletId,
        event: WalletEvent,
    ) -> WalletEventEnvelope {
        state.last_sequence = state
            .last_sequence
            .checked_add(1)
            .expect("wallet event sequence exhausted");
        WalletEventEnvelope {
            wallet,
            sequence: state.last_sequence,
            published_at_monotonic_nanos: self.monotonic_nanos(),
            event,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state
            .lock()
            .expect("wallet eventbus state lock poisoned")
    }

    fn monotonic_nanos(&self) -> u64 {
        u64::try_from(self.boot_instant.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

fn channel_for(
    wallets: &mut HashMap<WalletId, WalletChannel>,
    wallet: WalletId,
    capacity: usize,
) -> &mut WalletChannel {
    wallets.entry(wallet).or_insert_with(|| WalletChannel {
        sender: broadcast::channel(capacity).0,
        latest_snapshot: None,
    })
}

fn send(sender: &broadcast::Sender<WalletEventEnvelope>, envelope: &WalletEventEnvelope) {
    if sender.receiver_count() > 0 {
        let _ = sender.send(envelope.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast::error::{RecvError, TryRecvError};
    use tokio::time::timeout;
    use wallet_cache::WalletSnapshot;
    use wallet_protocol::{CommandFailure, CommandKind, WalletId};

    use super::{WalletEventBus, WalletEventBusConfig};
    use crate::event::WalletEvent;

    const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    fn failed() -> WalletEvent {
        WalletEvent::CommandFailed {
            command: CommandKind::Send,
            error: CommandFailure::CommandFailed {
                exit_code: Some(1),
                message: "insufficient funds".to_owned(),
            },
        }
    }

    fn changed(wallet: &WalletId, revision: u64) -> WalletEvent {
        let mut snapshot = WalletSnapshot::empty(wallet.clone());
        snapshot.revision = revision;
        WalletEvent::SnapshotChanged {
            snapshot: Arc::new(snapshot),
        }
    }

    #[test]
    #[should_panic(expected = "wallet event sequence exhausted")]
    fn publish_panics_when_sequence_space_is_exhausted() {
        let bus = WalletEventBus::default();
        bus.lock_state().last_sequence = u64::MAX;

        let _ = bus.publish("overflow".into(), WalletEvent::RefreshSkipped);
    }

    #[test]
    fn publish_allocates_monotonic_sequence_numbers() {
        let bus = WalletEventBus::default();
        let wallet = WalletId::new("a");

        let first = bus.publish(wallet.clone(), WalletEvent::RefreshSkipped);
        let second = bus.close_wallet(&wallet);

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert!(second.published_at_monotonic_nanos >= first.published_at_monotonic_nanos);
    }

    #[tokio::test]
    async fn publish_fans_out_to_wallet_and_global_subscribers() {
        let bus = WalletEventBus::default();
        let wallet = WalletId::new("a");
        let mut wallet_subscriber = bus.subscribe_wallet(wallet.clone());
        let mut global_subscriber = bus.subscribe_all();

        let published = bus.publish(wallet.clone(), changed(&wallet, 1));

        let wallet_envelope = timeout(TEST_TIMEOUT, wallet_subscriber.recv())
            .await
            .expect("wallet recv timed out")
            .expect("wallet recv should succeed");
        let global_envelope = timeout(TEST_TIMEOUT, global_subscriber.recv())
            .await
            .expect("global recv timed out")
            .expect("global recv should succeed");

        assert_eq!(wallet_envelope, published);
        assert_eq!(global_envelope, published);
        assert_eq!(
            wallet_envelope.event.snapshot().map(|snapshot| snapshot.revision),
            Some(1)
        );
    }

    #[tokio::test]
    async fn wallet_subscriptions_only_receive_matching_wallet_events() {
        let bus = WalletEventBus::default();
        let wallet_a = WalletId::new("a");
        let wallet_b = WalletId::new("b");
        let mut subscriber_a = bus.subscribe_wallet(wallet_a.clone());
        let mut subscriber_b = bus.subscribe_wallet(wallet_b.clone());

        let event_a = bus.publish(wallet_a, failed());
        let event_b = bus.publish(wallet_b, WalletEvent::RefreshSkipped);

        let received_a = timeout(TEST_TIMEOUT, subscriber_a.recv())
            .await
            .expect("wallet a recv timed out")
            .expect("wallet a recv should succeed");
        let received_b = timeout(TEST_TIMEOUT, subscriber_b.recv())
            .await
            .expect("wallet b recv timed out")
            .expect("wallet b recv should succeed");

        assert_eq!(received_a, event_a);
        assert_eq!(received_b, event_b);
        assert!(matches!(subscriber_a.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn late_subscriber_starts_from_latest_snapshot() {
        let bus = WalletEventBus::default();
        let wallet = WalletId::new("a");

        assert!(bus.subscribe_wallet_with_latest(wallet.clone()).latest.is_none());

        bus.publish(wallet.clone(), changed(&wallet, 1));
        let latest = bus.publish(wallet.clone(), changed(&wallet, 2));
        bus.publish(wallet.clone(), WalletEvent::RefreshSkipped);

        let mut subscription = bus.subscribe_wallet_with_latest(wallet.clone());
        assert_eq!(subscription.latest, Some(latest.clone()));
        assert!(matches!(subscription.events.try_recv(), Err(TryRecvError::Empty)));

        let next = bus.publish(wallet.clone(), failed());
        assert_eq!(subscription.events.try_recv().expect("next event"), next);
        assert!(next.sequence > latest.sequence);
    }

    #[tokio::test]
    async fn bounded_queue_reports_lag_for_slow_global_subscriber() {
        let bus = WalletEventBus::new(WalletEventBusConfig {
            wallet_buffer_capacity: 1,
            global_buffer_capacity: 1,
        });
        let wallet = WalletId::new("a");
        let mut global_subscriber = bus.subscribe_all();

        for _ in 0..8 {
            let _ = bus.publish(wallet.clone(), WalletEvent::RefreshSkipped);
        }

        let lagged = timeout(TEST_TIMEOUT, global_subscriber.recv())
            .await
            .expect("global recv timed out")
            .expect_err("expected lagged receiver due bounded buffer");

        match lagged {
            RecvError::Lagged(skipped) => assert!(skipped >= 1),
            RecvError::Closed => panic!("global channel unexpectedly closed"),
        }
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let bus = WalletEventBus::new(WalletEventBusConfig {
            wallet_buffer_capacity: 0,
            global_buffer_capacity: 0,
        });
        let wallet = WalletId::new("a");
        let mut subscriber = bus.subscribe_wallet(wallet.clone());

        let published = bus.publish(wallet, WalletEvent::RefreshSkipped);
        assert_eq!(subscriber.try_recv().expect("delivered"), published);
    }

    #[tokio::test]
    async fn close_wallet_delivers_session_closed_then_closes_subscribers() {
        let bus = WalletEventBus::default();
        let wallet = WalletId::new("a");
        bus.publish(wallet.clone(), changed(&wallet, 1));
        let mut subscriber = bus.subscribe_wallet(wallet.clone());

        let closed = bus.close_wallet(&wallet);

        let received = timeout(TEST_TIMEOUT, subscriber.recv())
            .await
            .expect("wallet recv timed out")
            .expect("session closed delivered");
        assert_eq!(received, closed);
        assert!(matches!(received.event, WalletEvent::SessionClosed));

        let end = timeout(TEST_TIMEOUT, subscriber.recv())
            .await
            .expect("wallet recv timed out")
            .expect_err("wallet subscription should close");
        assert!(matches!(end, RecvError::Closed));
        assert!(bus.subscribe_wallet_with_latest(wallet).latest.is_none());
    }
}
