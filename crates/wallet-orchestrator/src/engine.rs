use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use wallet_cache::StateCache;
use wallet_eventbus::{WalletEvent, WalletEventBus};
use wallet_invoker::{ProcessInvoker, WalletCommandLine};
use wallet_lock::WalletLockManager;
use wallet_parser::parse_response;
use wallet_protocol::{Command, CommandFailure, CommandKind, CommandResult, WalletId};
use wallet_scheduler::RefreshTarget;

use crate::session::{SessionGeneration, SessionRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    User,
    Refresh,
}

/// Shared state behind the facade. The refresh scheduler holds an `Arc` to
/// this so scheduled commands follow the exact path of user commands.
pub(crate) struct OrchestratorEngine {
    pub(crate) command_line: WalletCommandLine,
    pub(crate) invoker: Arc<dyn ProcessInvoker>,
    pub(crate) locks: WalletLockManager,
    pub(crate) cache: StateCache,
    pub(crate) bus: WalletEventBus,
    pub(crate) sessions: SessionRegistry,
}

impl OrchestratorEngine {
    pub(crate) fn new(command_line: WalletCommandLine, invoker: Arc<dyn ProcessInvoker>) -> Self {
        Self {
            command_line,
            invoker,
            locks: WalletLockManager::new(),
            cache: StateCache::new(),
            bus: WalletEventBus::default(),
            sessions: SessionRegistry::default(),
        }
    }

    pub(crate) fn begin_session(&self, wallet: &WalletId) -> (SessionGeneration, bool) {
        self.sessions.begin(wallet, || {
            self.cache.open(wallet);
        })
    }

    pub(crate) fn end_session(&self, wallet: &WalletId) -> bool {
        let ended = self
            .sessions
            .end(wallet, || {
                self.cache.close(wallet);
                self.bus.close_wallet(wallet);
            })
            .is_some();
        if ended {
            self.locks.forget(wallet);
        }
        ended
    }

    pub(crate) fn require_session(
        &self,
        wallet: &WalletId,
    ) -> Result<SessionGeneration, CommandFailure> {
        self.sessions
            .current(wallet)
            .ok_or_else(|| CommandFailure::SessionNotOpen(wallet.clone()))
    }

    pub(crate) async fn execute(&self, command: Command, origin: Origin) -> CommandResult {
        let generation = self.require_session(&command.wallet)?;
        let _lease = self.locks.acquire(&command).await;
        self.run_leased(&command, generation, origin).await
    }

    /// Invokes, parses and settles one command. The caller must hold a lease
    /// covering `command`.
    pub(crate) async fn run_leased(
        &self,
        command: &Command,
        generation: SessionGeneration,
        origin: Origin,
    ) -> CommandResult {
        let request = self.command_line.request_for(command);
        debug!(
            wallet = %command.wallet,
            command = command.kind.as_key(),
            invocation = %request.rendered(),
            "invoking wallet command"
        );

        let result = match self.invoker.invoke(&request).await {
            Ok(output) => parse_response(command.kind, &output),
            Err(error) => Err(CommandFailure::from(error)),
        };
        self.settle(command, generation, origin, result)
    }

    fn settle(
        &self,
        command: &Command,
        generation: SessionGeneration,
        origin: Origin,
        result: CommandResult,
    ) -> CommandResult {
        let committed = self.sessions.commit(&command.wallet, generation, || match &result {
            Ok(_) => {
                if let Some(snapshot) = self.cache.apply_result(command, &result) {
                    self.bus.publish(
                        command.wallet.clone(),
                        WalletEvent::SnapshotChanged { snapshot },
                    );
                }
            }
            Err(error) if origin == Origin::User => {
                self.bus.publish(
                    command.wallet.clone(),
                    WalletEvent::CommandFailed {
                        command: command.kind,
                        error: error.clone(),
                    },
                );
            }
            Err(_) => {}
        });

        if committed.is_none() {
            warn!(
                wallet = %command.wallet,
                command = command.kind.as_key(),
                "discarding result of command whose wallet session closed"
            );
            return Err(CommandFailure::SessionClosed(command.wallet.clone()));
        }

        if let (Err(error), Origin::User) = (&result, origin) {
            warn!(
                wallet = %command.wallet,
                command = command.kind.as_key(),
                error = %error,
                "wallet command failed"
            );
        }
        result
    }
}

#[async_trait]
impl RefreshTarget for OrchestratorEngine {
    fn mutation_pending(&self, wallet: &WalletId) -> bool {
        self.locks.mutation_pending(wallet)
    }

    async fn run_refresh(&self, command: Command) -> CommandResult {
        self.execute(command, Origin::Refresh).await
    }

    fn refresh_failed(&self, wallet: &WalletId, command: CommandKind, error: CommandFailure) {
        let Some(generation) = self.sessions.current(wallet) else {
            return;
        };
        self.sessions.commit(wallet, generation, || {
            let snapshot = self.cache.mark_refresh_failed(wallet, &error);
            self.bus.publish(
                wallet.clone(),
                WalletEvent::RefreshFailed {
                    command,
                    error,
                    snapshot,
                },
            );
        });
    }

    fn refresh_skipped(&self, wallet: &WalletId) {
        if self.sessions.current(wallet).is_some() {
            self.bus.publish(wallet.clone(), WalletEvent::RefreshSkipped);
        }
    }
}
