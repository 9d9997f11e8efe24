use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use wallet_protocol::{
    Balance, BalanceReport, Command, CommandFailure, CommandPayload, CommandResult,
    NetworkStatus, TransactionRecord, WalletId,
};

/// Last-known-good view of one wallet. Published whole behind an `Arc`;
/// holders of an older snapshot never observe a partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSnapshot {
    pub wallet: WalletId,
    pub balance: Option<Balance>,
    pub transactions: Vec<TransactionRecord>,
    pub network: Option<NetworkStatus>,
    pub last_refreshed_at: Option<SystemTime>,
    pub stale_since: Option<SystemTime>,
    pub last_error: Option<String>,
    pub revision: u64,
}

impl WalletSnapshot {
    pub fn empty(wallet: WalletId) -> Self {
        Self {
            wallet,
            balance: None,
            transactions: Vec::new(),
            network: None,
            last_refreshed_at: None,
            stale_since: None,
            last_error: None,
            revision: 0,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale_since.is_some()
    }

    /// The cached balance in the shape a `show-balance` reply has.
    pub fn balance_report(&self) -> Option<BalanceReport> {
        self.balance.map(|balance| BalanceReport {
            balance,
            network: self.network.clone(),
        })
    }

    fn absorb(&mut self, payload: &CommandPayload) -> bool {
        match payload {
            CommandPayload::Balance(report) => {
                self.balance = Some(report.balance);
                if let Some(network) = &report.network {
                    self.network = Some(network.clone());
                }
            }
            CommandPayload::Transactions(transactions) => {
                self.transactions = transactions.clone();
            }
            CommandPayload::NetworkStatus(status) => {
                self.network = Some(status.clone());
            }
            CommandPayload::TransactionDraft(_)
            | CommandPayload::SendConfirmation(_)
            | CommandPayload::Block(_)
            | CommandPayload::Acknowledged { .. } => return false,
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct StateCache {
    wallets: RwLock<HashMap<WalletId, Arc<WalletSnapshot>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty snapshot for `wallet`, or returns the one already open.
    pub fn open(&self, wallet: &WalletId) -> Arc<WalletSnapshot> {
        let mut wallets = self.wallets.write().expect("wallet state cache write lock");
        Arc::clone(
            wallets
                .entry(wallet.clone())
                .or_insert_with(|| Arc::new(WalletSnapshot::empty(wallet.clone()))),
        )
    }

    pub fn close(&self, wallet: &WalletId) -> Option<Arc<WalletSnapshot>> {
        self.wallets
            .write()
            .expect("wallet state cache write lock")
            .remove(wallet)
    }

    pub fn is_open(&self, wallet: &WalletId) -> bool {
        self.wallets
            .read()
            .expect("wallet state cache read lock")
            .contains_key(wallet)
    }

    pub fn read(&self, wallet: &WalletId) -> Option<Arc<WalletSnapshot>> {
        self.wallets
            .read()
            .expect("wallet state cache read lock")
            .get(wallet)
            .cloned()
    }

    pub fn open_wallets(&self) -> Vec<WalletId> {
        let mut wallets = self
            .wallets
            .read()
            .expect("wallet state cache read lock")
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        wallets.sort();
        wallets
    }

    /// Folds a successful result into the wallet's snapshot and returns the
    /// new snapshot. Failures, payloads that carry no wallet state and
    /// wallets without an open snapshot leave the cache untouched and yield
    /// `None`.
    pub fn apply_result(
        &self,
        command: &Command,
        result: &CommandResult,
    ) -> Option<Arc<WalletSnapshot>> {
        let payload = result.as_ref().ok()?;
        self.update(&command.wallet, |snapshot| {
            if !snapshot.absorb(payload) {
                return false;
            }
            snapshot.last_refreshed_at = Some(SystemTime::now());
            snapshot.stale_since = None;
            snapshot.last_error = None;
            true
        })
    }

    /// Records a failed scheduled refresh. Balance, transactions and network
    /// status stay as they were; `stale_since` keeps the first failure time.
    pub fn mark_refresh_failed(
        &self,
        wallet: &WalletId,
        error: &CommandFailure,
    ) -> Option<Arc<WalletSnapshot>> {
        self.update(wallet, |snapshot| {
            if snapshot.stale_since.is_none() {
                snapshot.stale_since = Some(SystemTime::now());
            }
            snapshot.last_error = Some(error.to_string());
            true
        })
    }

    fn update<F>(&self, wallet: &WalletId, apply: F) -> Option<Arc<WalletSnapshot>>
    where
        F: FnOnce(&mut WalletSnapshot) -> bool,
    {
        let mut wallets = self.wallets.write().expect("wallet state cache write lock");
        let Some(current) = wallets.get_mut(wallet) else {
            tracing::debug!(wallet = %wallet, "ignoring update for wallet without open snapshot");
            return None;
        };

        let mut next = WalletSnapshot::clone(current);
        if !apply(&mut next) {
            return None;
        }
        next.revision = current.revision.saturating_add(1);

        let next = Arc::new(next);
        *current = Arc::clone(&next);
        Some(next)
    }
}
