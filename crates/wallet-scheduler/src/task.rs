use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};
use wallet_protocol::{
    Command, CommandFailure, CommandKind, CommandPayload, CommandResult, FailureKind, WalletId,
};

pub type RefreshTaskId = u64;

/// Floor for the tick period. `interval_at` panics on a zero period.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

/// Commands issued on every tick, in order. The status command is left out
/// when the balance reply already carried the chain tip.
pub const REFRESH_COMMANDS: [CommandKind; 3] = [
    CommandKind::GetBalance,
    CommandKind::GetNetworkStatus,
    CommandKind::ListTransactions,
];

/// What a refresh tick drives. Implemented by the orchestration facade so
/// scheduled commands take the same lease, parse and cache path as user
/// commands.
#[async_trait]
pub trait RefreshTarget: Send + Sync {
    fn mutation_pending(&self, wallet: &WalletId) -> bool;
    async fn run_refresh(&self, command: Command) -> CommandResult;
    fn refresh_failed(&self, wallet: &WalletId, command: CommandKind, error: CommandFailure);
    fn refresh_skipped(&self, wallet: &WalletId);
}

#[derive(Debug)]
struct PollerState {
    task_id: RefreshTaskId,
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

pub struct RefreshScheduler {
    target: Arc<dyn RefreshTarget>,
    interval: Duration,
    next_task_id: AtomicU64,
    pollers: Mutex<HashMap<WalletId, PollerState>>,
}

impl RefreshScheduler {
    pub fn new(target: Arc<dyn RefreshTarget>, interval: Duration) -> Self {
        if interval < MIN_REFRESH_INTERVAL {
            warn!(
                interval_ms = interval.as_millis() as u64,
                "refresh interval below minimum; clamping"
            );
        }
        Self {
            target,
            interval: interval.max(MIN_REFRESH_INTERVAL),
            next_task_id: AtomicU64::new(0),
            pollers: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts the refresh loop for `wallet`. The first tick fires one
    /// interval from now. Starting an already running wallet returns the
    /// existing task id.
    pub async fn start(&self, wallet: WalletId) -> RefreshTaskId {
        let mut pollers = self.pollers.lock().await;
        if let Some(state) = pollers.get(&wallet) {
            return state.task_id;
        }

        let task_id = self.allocate_task_id();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let target = Arc::clone(&self.target);
        let period = self.interval;
        let task_wallet = wallet.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = refresh_once(target.as_ref(), &task_wallet) => {}
                }
            }
            debug!(wallet = %task_wallet, task_id, "refresh loop stopped");
        });

        debug!(
            wallet = %wallet,
            task_id,
            interval_ms = period.as_millis() as u64,
            "refresh loop started"
        );
        pollers.insert(
            wallet,
            PollerState {
                task_id,
                stop_tx: Some(stop_tx),
                task,
            },
        );
        task_id
    }

    /// Stops the loop for `wallet` and waits for it to exit. An in-flight
    /// refresh is dropped, not awaited.
    pub async fn stop(&self, wallet: &WalletId) -> bool {
        let state = {
            let mut pollers = self.pollers.lock().await;
            pollers.remove(wallet)
        };

        match state {
            Some(state) => {
                shutdown(wallet, state).await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let states = {
            let mut pollers = self.pollers.lock().await;
            pollers.drain().collect::<Vec<_>>()
        };

        for (wallet, state) in states {
            shutdown(&wallet, state).await;
        }
    }

    pub async fn is_running(&self, wallet: &WalletId) -> bool {
        self.pollers.lock().await.contains_key(wallet)
    }

    pub async fn task_id(&self, wallet: &WalletId) -> Option<RefreshTaskId> {
        self.pollers
            .lock()
            .await
            .get(wallet)
            .map(|state| state.task_id)
    }

    fn allocate_task_id(&self) -> RefreshTaskId {
        self.next_task_id
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_add(1)
            })
            .ok()
            .and_then(|previous| previous.checked_add(1))
            .expect("refresh scheduler task id space exhausted")
    }
}

async fn shutdown(wallet: &WalletId, mut state: PollerState) {
    if let Some(stop_tx) = state.stop_tx.take() {
        let _ = stop_tx.send(());
    }
    if let Err(error) = state.task.await {
        warn!(wallet = %wallet, error = %error, "refresh loop join failed");
    }
}

async fn refresh_once(target: &dyn RefreshTarget, wallet: &WalletId) {
    let mut tip_known = false;
    for kind in REFRESH_COMMANDS {
        if kind == CommandKind::GetNetworkStatus && tip_known {
            continue;
        }
        if target.mutation_pending(wallet) {
            debug!(
                wallet = %wallet,
                command = kind.as_key(),
                "skipping refresh while a mutation is pending"
            );
            target.refresh_skipped(wallet);
            return;
        }

        let command = Command::new(kind, wallet.clone());
        match target.run_refresh(command).await {
            Ok(CommandPayload::Balance(report)) => tip_known = report.network.is_some(),
            Ok(_) => {}
            Err(error) => {
                report_failure(target, wallet, kind, error);
                return;
            }
        }
    }
}

fn report_failure(
    target: &dyn RefreshTarget,
    wallet: &WalletId,
    kind: CommandKind,
    error: CommandFailure,
) {
    match error.kind() {
        FailureKind::SessionClosed | FailureKind::SessionNotOpen => {
            debug!(wallet = %wallet, command = kind.as_key(), "refresh result discarded");
        }
        _ => {
            warn!(
                wallet = %wallet,
                command = kind.as_key(),
                error = %error,
                "wallet refresh failed"
            );
            target.refresh_failed(wallet, kind, error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::{sleep, timeout};
    use wallet_protocol::{
        Balance, BalanceReport, Command, CommandFailure, CommandKind, CommandPayload,
        CommandResult, NetworkStatus, WalletId,
    };

    use super::{RefreshScheduler, RefreshTarget, MIN_REFRESH_INTERVAL, REFRESH_COMMANDS};

    const TICK: Duration = Duration::from_millis(20);

    #[derive(Default)]
    struct RecordingTarget {
        mutation_pending: AtomicBool,
        invocations: Mutex<Vec<(WalletId, CommandKind)>>,
        failures: Mutex<VecDeque<CommandFailure>>,
        reported_failures: Mutex<Vec<(CommandKind, CommandFailure)>>,
        skipped: AtomicUsize,
        refresh_delay: Option<Duration>,
        balance_reply: Option<CommandPayload>,
    }

    impl RecordingTarget {
        fn invocations(&self) -> Vec<(WalletId, CommandKind)> {
            self.invocations.lock().expect("invocations lock").clone()
        }

        fn invocation_count(&self) -> usize {
            self.invocations.lock().expect("invocations lock").len()
        }

        fn fail_next(&self, failure: CommandFailure) {
            self.failures
                .lock()
                .expect("failures lock")
                .push_back(failure);
        }
    }

    #[async_trait]
    impl RefreshTarget for RecordingTarget {
        fn mutation_pending(&self, _wallet: &WalletId) -> bool {
            self.mutation_pending.load(Ordering::SeqCst)
        }

        async fn run_refresh(&self, command: Command) -> CommandResult {
            self.invocations
                .lock()
                .expect("invocations lock")
                .push((command.wallet.clone(), command.kind));
            if let Some(delay) = self.refresh_delay {
                sleep(delay).await;
            }
            if let Some(failure) = self.failures.lock().expect("failures lock").pop_front() {
                return Err(failure);
            }
            match (&self.balance_reply, command.kind) {
                (Some(reply), CommandKind::GetBalance) => Ok(reply.clone()),
                _ => Ok(CommandPayload::Acknowledged { message: None }),
            }
        }

        fn refresh_failed(&self, _wallet: &WalletId, command: CommandKind, error: CommandFailure) {
            self.reported_failures
                .lock()
                .expect("reported failures lock")
                .push((command, error));
        }

        fn refresh_skipped(&self, _wallet: &WalletId) {
            self.skipped.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_until<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        timeout(Duration::from_secs(1), async {
            loop {
                if condition() {
                    return;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached before timeout");
    }

    #[tokio::test]
    async fn start_is_idempotent_and_task_ids_are_monotonic() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = RefreshScheduler::new(target, Duration::from_secs(3600));

        let first = scheduler.start(WalletId::new("a")).await;
        let again = scheduler.start(WalletId::new("a")).await;
        let second = scheduler.start(WalletId::new("b")).await;

        assert_eq!(first, again);
        assert!(second > first);
        assert!(scheduler.is_running(&WalletId::new("a")).await);

        scheduler.stop_all().await;
        assert!(!scheduler.is_running(&WalletId::new("a")).await);
        assert!(scheduler.task_id(&WalletId::new("b")).await.is_none());
    }

    #[tokio::test]
    async fn tick_refreshes_balance_status_and_transactions_in_order() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() >= REFRESH_COMMANDS.len()).await;
        scheduler.stop(&wallet).await;

        let first_tick = target
            .invocations()
            .into_iter()
            .take(REFRESH_COMMANDS.len())
            .collect::<Vec<_>>();
        assert_eq!(
            first_tick,
            REFRESH_COMMANDS
                .iter()
                .map(|kind| (wallet.clone(), *kind))
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn tick_is_skipped_while_mutation_is_pending() {
        let target = Arc::new(RecordingTarget::default());
        target.mutation_pending.store(true, Ordering::SeqCst);
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.skipped.load(Ordering::SeqCst) >= 2).await;

        assert_eq!(target.invocation_count(), 0);

        target.mutation_pending.store(false, Ordering::SeqCst);
        wait_until(|| target.invocation_count() > 0).await;
        scheduler.stop(&wallet).await;
    }

    #[tokio::test]
    async fn failed_refresh_is_reported_and_loop_keeps_running() {
        let target = Arc::new(RecordingTarget::default());
        target.fail_next(CommandFailure::ProcessTimeout { timeout_ms: 30_000 });
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() >= 1 + REFRESH_COMMANDS.len()).await;
        scheduler.stop(&wallet).await;

        let reported = target
            .reported_failures
            .lock()
            .expect("reported failures lock")
            .clone();
        assert_eq!(
            reported,
            vec![(
                CommandKind::GetBalance,
                CommandFailure::ProcessTimeout { timeout_ms: 30_000 }
            )]
        );
        let invocations = target.invocations();
        assert_eq!(invocations[0].1, CommandKind::GetBalance);
        assert_eq!(
            invocations[1].1,
            CommandKind::GetBalance,
            "a failed tick stops before status and transactions"
        );
    }

    #[tokio::test]
    async fn discarded_results_are_not_reported_as_failures() {
        let target = Arc::new(RecordingTarget::default());
        target.fail_next(CommandFailure::SessionClosed(WalletId::new("a")));
        let scheduler = RefreshScheduler::new(target.clone(), TICK);

        scheduler.start(WalletId::new("a")).await;
        wait_until(|| target.invocation_count() >= 2).await;
        scheduler.stop_all().await;

        assert!(target
            .reported_failures
            .lock()
            .expect("reported failures lock")
            .is_empty());
    }

    #[tokio::test]
    async fn no_ticks_fire_after_stop_returns() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() > 0).await;
        assert!(scheduler.stop(&wallet).await);
        assert!(!scheduler.stop(&wallet).await);

        let count_at_stop = target.invocation_count();
        sleep(TICK * 4).await;
        assert_eq!(target.invocation_count(), count_at_stop);
    }

    #[tokio::test]
    async fn stop_does_not_wait_for_in_flight_refresh() {
        let target = Arc::new(RecordingTarget {
            refresh_delay: Some(Duration::from_secs(30)),
            ..RecordingTarget::default()
        });
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() == 1).await;

        timeout(Duration::from_secs(1), scheduler.stop(&wallet))
            .await
            .expect("stop returns without awaiting the in-flight refresh");
        assert_eq!(target.invocation_count(), 1);
    }

    #[tokio::test]
    async fn balance_reply_with_chain_tip_skips_status_command() {
        let target = Arc::new(RecordingTarget {
            balance_reply: Some(CommandPayload::Balance(BalanceReport {
                balance: Balance {
                    total_nicks: 5,
                    available_nicks: 5,
                },
                network: Some(NetworkStatus {
                    height: 42,
                    ..NetworkStatus::default()
                }),
            })),
            ..RecordingTarget::default()
        });
        let scheduler = RefreshScheduler::new(target.clone(), TICK);
        let wallet = WalletId::new("a");

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() >= 2).await;
        scheduler.stop(&wallet).await;

        let kinds = target
            .invocations()
            .into_iter()
            .take(2)
            .map(|(_, kind)| kind)
            .collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![CommandKind::GetBalance, CommandKind::ListTransactions]
        );
    }

    #[tokio::test]
    async fn zero_interval_is_clamped_instead_of_killing_the_loop() {
        let target = Arc::new(RecordingTarget::default());
        let scheduler = RefreshScheduler::new(target.clone(), Duration::ZERO);
        let wallet = WalletId::new("a");
        assert_eq!(scheduler.interval(), MIN_REFRESH_INTERVAL);

        scheduler.start(wallet.clone()).await;
        wait_until(|| target.invocation_count() >= 2 * REFRESH_COMMANDS.len()).await;
        assert!(scheduler.is_running(&wallet).await);
        scheduler.stop(&wallet).await;
    }
}
