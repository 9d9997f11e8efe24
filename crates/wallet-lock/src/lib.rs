//! Per-wallet reader/writer admission for wallet commands.
//!
//! Mutating commands hold a wallet exclusively; read-only commands share it.
//! Admission is FIFO across both kinds, so a read-only request that arrives
//! behind a queued mutating request waits for it. Dropping a queued
//! `acquire` future withdraws the request; dropping a lease releases it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use wallet_protocol::{Command, CommandAccess, WalletId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Mutating,
    ReadOnly(usize),
}

#[derive(Debug, Default)]
struct WalletGate {
    gate: Arc<RwLock<()>>,
    pending_mutations: AtomicUsize,
    active_readers: AtomicUsize,
    writer_active: AtomicBool,
    // Forgotten while still referenced; swept once the last holder is gone.
    retired: AtomicBool,
}

impl WalletGate {
    fn state(&self) -> LockState {
        if self.writer_active.load(Ordering::SeqCst) {
            return LockState::Mutating;
        }
        match self.active_readers.load(Ordering::SeqCst) {
            0 => LockState::Idle,
            readers => LockState::ReadOnly(readers),
        }
    }
}

/// Counts a mutating request from the moment it queues until its lease is
/// released, including the cancelled-while-queued path.
#[derive(Debug)]
struct PendingMutation {
    gate: Arc<WalletGate>,
}

impl PendingMutation {
    fn register(gate: &Arc<WalletGate>) -> Self {
        gate.pending_mutations.fetch_add(1, Ordering::SeqCst);
        Self {
            gate: Arc::clone(gate),
        }
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        self.gate.pending_mutations.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
enum LeaseGuard {
    Shared {
        _guard: OwnedRwLockReadGuard<()>,
    },
    Exclusive {
        _guard: OwnedRwLockWriteGuard<()>,
        _pending: PendingMutation,
    },
}

/// Proof of admission for one command. Releasing is dropping.
#[derive(Debug)]
pub struct WalletLease {
    wallet: WalletId,
    access: CommandAccess,
    gate: Arc<WalletGate>,
    guard: Option<LeaseGuard>,
}

impl WalletLease {
    pub fn wallet(&self) -> &WalletId {
        &self.wallet
    }

    pub fn access(&self) -> CommandAccess {
        self.access
    }
}

impl Drop for WalletLease {
    fn drop(&mut self) {
        match self.access {
            CommandAccess::Mutating => self.gate.writer_active.store(false, Ordering::SeqCst),
            CommandAccess::ReadOnly => {
                self.gate.active_readers.fetch_sub(1, Ordering::SeqCst);
            }
        }
        self.guard.take();
        tracing::trace!(wallet = %self.wallet, access = ?self.access, "wallet lease released");
    }
}

#[derive(Debug, Default)]
pub struct WalletLockManager {
    wallets: Mutex<HashMap<WalletId, Arc<WalletGate>>>,
}

impl WalletLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, command: &Command) -> WalletLease {
        self.acquire_for(&command.wallet, command.access()).await
    }

    pub async fn acquire_for(&self, wallet: &WalletId, access: CommandAccess) -> WalletLease {
        let gate = self.gate(wallet);
        let guard = match access {
            CommandAccess::Mutating => {
                let pending = PendingMutation::register(&gate);
                let guard = Arc::clone(&gate.gate).write_owned().await;
                gate.writer_active.store(true, Ordering::SeqCst);
                LeaseGuard::Exclusive {
                    _guard: guard,
                    _pending: pending,
                }
            }
            CommandAccess::ReadOnly => {
                let guard = Arc::clone(&gate.gate).read_owned().await;
                gate.active_readers.fetch_add(1, Ordering::SeqCst);
                LeaseGuard::Shared { _guard: guard }
            }
        };
        tracing::trace!(wallet = %wallet, access = ?access, "wallet lease acquired");

        WalletLease {
            wallet: wallet.clone(),
            access,
            gate,
            guard: Some(guard),
        }
    }

    pub fn state(&self, wallet: &WalletId) -> LockState {
        self.existing_gate(wallet)
            .map(|gate| gate.state())
            .unwrap_or(LockState::Idle)
    }

    /// True while a mutating command is queued or running on `wallet`.
    pub fn mutation_pending(&self, wallet: &WalletId) -> bool {
        self.existing_gate(wallet)
            .is_some_and(|gate| gate.pending_mutations.load(Ordering::SeqCst) > 0)
    }

    /// Drops the bookkeeping for `wallet` once nothing holds or awaits it.
    /// Returns false while leases are outstanding: the entry stays so a
    /// reopened session keeps excluding an abandoned in-flight command, and
    /// is swept by a later `forget` or `acquire` after the last lease drops.
    pub fn forget(&self, wallet: &WalletId) -> bool {
        let mut wallets = self
            .wallets
            .lock()
            .expect("wallet lock manager registry poisoned");
        let removed = match wallets.get(wallet) {
            Some(gate) if Arc::strong_count(gate) == 1 => {
                wallets.remove(wallet);
                true
            }
            Some(gate) => {
                gate.retired.store(true, Ordering::SeqCst);
                false
            }
            None => false,
        };
        sweep_retired(&mut wallets);
        removed
    }

    pub fn tracked_wallets(&self) -> usize {
        self.wallets
            .lock()
            .expect("wallet lock manager registry poisoned")
            .len()
    }

    fn gate(&self, wallet: &WalletId) -> Arc<WalletGate> {
        let mut wallets = self
            .wallets
            .lock()
            .expect("wallet lock manager registry poisoned");
        sweep_retired(&mut wallets);
        let gate = Arc::clone(wallets.entry(wallet.clone()).or_default());
        gate.retired.store(false, Ordering::SeqCst);
        gate
    }

    fn existing_gate(&self, wallet: &WalletId) -> Option<Arc<WalletGate>> {
        self.wallets
            .lock()
            .expect("wallet lock manager registry poisoned")
            .get(wallet)
            .cloned()
    }
}

// Callers hold the registry lock, so no new reference can appear between the
// count check and the removal.
fn sweep_retired(wallets: &mut HashMap<WalletId, Arc<WalletGate>>) {
    wallets.retain(|wallet, gate| {
        let idle = gate.retired.load(Ordering::SeqCst) && Arc::strong_count(gate) == 1;
        if idle {
            tracing::trace!(wallet = %wallet, "swept forgotten wallet lock");
        }
        !idle
    });
}
