use std::collections::HashMap;
use std::sync::Mutex;

use wallet_protocol::WalletId;

pub(crate) type SessionGeneration = u64;

#[derive(Debug, Default)]
struct SessionTable {
    next_generation: SessionGeneration,
    active: HashMap<WalletId, SessionGeneration>,
}

/// Open wallet sessions keyed by wallet. Every open gets a fresh
/// generation; results are only committed while the generation they were
/// started under is still the current one.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    table: Mutex<SessionTable>,
}

impl SessionRegistry {
    /// Returns the session generation and whether this call created it.
    /// `on_open` runs under the registry lock for new sessions only.
    pub(crate) fn begin<F>(&self, wallet: &WalletId, on_open: F) -> (SessionGeneration, bool)
    where
        F: FnOnce(),
    {
        let mut table = self.table.lock().expect("wallet session registry poisoned");
        if let Some(generation) = table.active.get(wallet) {
            return (*generation, false);
        }

        table.next_generation = table
            .next_generation
            .checked_add(1)
            .expect("wallet session generation space exhausted");
        let generation = table.next_generation;
        table.active.insert(wallet.clone(), generation);
        on_open();
        (generation, true)
    }

    pub(crate) fn current(&self, wallet: &WalletId) -> Option<SessionGeneration> {
        self.table
            .lock()
            .expect("wallet session registry poisoned")
            .active
            .get(wallet)
            .copied()
    }

    /// Runs `apply` under the registry lock if `generation` is still the
    /// open session for `wallet`.
    pub(crate) fn commit<F, R>(
        &self,
        wallet: &WalletId,
        generation: SessionGeneration,
        apply: F,
    ) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        let table = self.table.lock().expect("wallet session registry poisoned");
        match table.active.get(wallet) {
            Some(current) if *current == generation => Some(apply()),
            _ => None,
        }
    }

    /// Ends the session; `on_close` runs under the registry lock.
    pub(crate) fn end<F>(&self, wallet: &WalletId, on_close: F) -> Option<SessionGeneration>
    where
        F: FnOnce(),
    {
        let mut table = self.table.lock().expect("wallet session registry poisoned");
        let generation = table.active.remove(wallet)?;
        on_close();
        Some(generation)
    }

    pub(crate) fn open_wallets(&self) -> Vec<WalletId> {
        let mut wallets = self
            .table
            .lock()
            .expect("wallet session registry poisoned")
            .active
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        wallets.sort();
        wallets
    }
}

#[cfg(test)]
mod tests {
    use wallet_protocol::WalletId;

    use super::SessionRegistry;

    #[test]
    fn reopening_after_close_yields_new_generation() {
        let sessions = SessionRegistry::default();
        let wallet = WalletId::new("a");

        let (first, fresh) = sessions.begin(&wallet, || {});
        assert!(fresh);
        let (again, fresh) = sessions.begin(&wallet, || panic!("not reopened"));
        assert_eq!(again, first);
        assert!(!fresh);

        assert_eq!(sessions.end(&wallet, || {}), Some(first));
        let (second, _) = sessions.begin(&wallet, || {});
        assert!(second > first);
    }

    #[test]
    fn commit_only_applies_for_current_generation() {
        let sessions = SessionRegistry::default();
        let wallet = WalletId::new("a");
        let (stale, _) = sessions.begin(&wallet, || {});
        sessions.end(&wallet, || {});
        let (current, _) = sessions.begin(&wallet, || {});

        assert_eq!(sessions.commit(&wallet, stale, || "applied"), None);
        assert_eq!(sessions.commit(&wallet, current, || "applied"), Some("applied"));
        assert_eq!(sessions.commit(&WalletId::new("b"), current, || ()), None);
    }
}
