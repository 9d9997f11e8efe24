use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;
use wallet_cache::WalletSnapshot;
use wallet_config::SessionConfig;
use wallet_eventbus::{WalletEventEnvelope, WalletSubscription};
use wallet_invoker::{ProcessInvoker, TokioProcessInvoker, WalletCommandLine};
use wallet_lock::LockState;
use wallet_parser::extract_error;
use wallet_protocol::{
    BalanceReport, BlockSummary, Command, CommandFailure, CommandKind, CommandPayload,
    CommandResult, NetworkStatus, SendConfirmation, TransactionRecord, TransferRequest, WalletId,
};
use wallet_scheduler::{RefreshScheduler, RefreshTarget, REFRESH_COMMANDS};

use crate::engine::{OrchestratorEngine, Origin};

/// Drives the wallet binary for any number of open wallet sessions.
///
/// Every command goes through the same path: per-wallet lease, process
/// invocation, response parsing, cache update, lease release, then
/// subscriber notification. Opening a session also starts its periodic
/// refresh; closing it stops the refresh and discards the results of any
/// command still in flight.
pub struct WalletOrchestrator {
    engine: Arc<OrchestratorEngine>,
    scheduler: RefreshScheduler,
}

impl WalletOrchestrator {
    pub fn new(session: SessionConfig) -> Self {
        Self::with_invoker(session, Arc::new(TokioProcessInvoker))
    }

    pub fn with_invoker(session: SessionConfig, invoker: Arc<dyn ProcessInvoker>) -> Self {
        let refresh_interval = session.refresh_interval;
        let engine = Arc::new(OrchestratorEngine::new(
            WalletCommandLine::new(session),
            invoker,
        ));
        let target: Arc<dyn RefreshTarget> = engine.clone();
        Self {
            engine,
            scheduler: RefreshScheduler::new(target, refresh_interval),
        }
    }

    pub fn session_config(&self) -> &SessionConfig {
        self.engine.command_line.session()
    }

    pub async fn open_wallet(
        &self,
        wallet: WalletId,
    ) -> Result<Arc<WalletSnapshot>, CommandFailure> {
        self.start_session(Command::open_wallet(wallet.clone())).await?;
        self.snapshot(&wallet)
            .ok_or(CommandFailure::SessionClosed(wallet))
    }

    /// Generates a new key pair for `wallet` and opens a session on it.
    pub async fn create_wallet(&self, wallet: WalletId) -> Result<Option<String>, CommandFailure> {
        let payload = self.start_session(Command::create_wallet(wallet)).await?;
        Ok(acknowledgement(payload))
    }

    pub async fn import_wallet(
        &self,
        wallet: WalletId,
        keys_file: impl Into<String>,
    ) -> Result<Option<String>, CommandFailure> {
        let payload = self
            .start_session(Command::import_wallet(wallet, keys_file))
            .await?;
        Ok(acknowledgement(payload))
    }

    pub async fn close_wallet(&self, wallet: &WalletId) -> bool {
        self.scheduler.stop(wallet).await;
        let closed = self.engine.end_session(wallet);
        if closed {
            info!(wallet = %wallet, "wallet session closed");
        }
        closed
    }

    pub async fn execute(&self, command: Command) -> CommandResult {
        self.engine.execute(command, Origin::User).await
    }

    pub async fn balance(&self, wallet: &WalletId) -> Result<BalanceReport, CommandFailure> {
        match self.execute(Command::get_balance(wallet.clone())).await? {
            CommandPayload::Balance(report) => Ok(report),
            _ => Err(unexpected_payload(CommandKind::GetBalance)),
        }
    }

    pub async fn transactions(
        &self,
        wallet: &WalletId,
    ) -> Result<Vec<TransactionRecord>, CommandFailure> {
        match self.execute(Command::list_transactions(wallet.clone())).await? {
            CommandPayload::Transactions(transactions) => Ok(transactions),
            _ => Err(unexpected_payload(CommandKind::ListTransactions)),
        }
    }

    pub async fn network_status(&self, wallet: &WalletId) -> Result<NetworkStatus, CommandFailure> {
        match self.execute(Command::network_status(wallet.clone())).await? {
            CommandPayload::NetworkStatus(status) => Ok(status),
            _ => Err(unexpected_payload(CommandKind::GetNetworkStatus)),
        }
    }

    pub async fn block(
        &self,
        wallet: &WalletId,
        height: u64,
    ) -> Result<BlockSummary, CommandFailure> {
        match self.execute(Command::get_block(wallet.clone(), height)).await? {
            CommandPayload::Block(block) => Ok(block),
            _ => Err(unexpected_payload(CommandKind::GetBlock)),
        }
    }

    pub async fn export_keys(
        &self,
        wallet: &WalletId,
        output: impl Into<String>,
    ) -> Result<Option<String>, CommandFailure> {
        let payload = self
            .execute(Command::export_keys(wallet.clone(), output))
            .await?;
        Ok(acknowledgement(payload))
    }

    /// A transfer to `recipient` using the configured default fee.
    pub fn transfer(&self, recipient: impl Into<String>, amount_nicks: u64) -> TransferRequest {
        TransferRequest {
            recipient: recipient.into(),
            amount_nicks,
            fee_nicks: self.session_config().default_fee,
            note_names: Vec::new(),
        }
    }

    /// Builds the transaction with `create-tx`, then submits the resulting
    /// file with `send-tx`. Both phases run under one exclusive lease, so no
    /// refresh observes the wallet between them.
    pub async fn send(
        &self,
        wallet: &WalletId,
        transfer: TransferRequest,
    ) -> Result<SendConfirmation, CommandFailure> {
        validate_transfer(&transfer)?;
        let generation = self.engine.require_session(wallet)?;
        let create = Command::create_transaction(wallet.clone(), &transfer);
        let _lease = self.engine.locks.acquire(&create).await;

        info!(
            wallet = %wallet,
            recipient = %transfer.recipient,
            amount_nicks = transfer.amount_nicks,
            fee_nicks = transfer.fee_nicks,
            "creating transaction"
        );
        let draft = match self
            .engine
            .run_leased(&create, generation, Origin::User)
            .await?
        {
            CommandPayload::TransactionDraft(draft) => draft,
            _ => return Err(unexpected_payload(CommandKind::CreateTransaction)),
        };

        let submit = Command::send_transaction(wallet.clone(), draft.tx_file.clone());
        match self
            .engine
            .run_leased(&submit, generation, Origin::User)
            .await?
        {
            CommandPayload::SendConfirmation(mut confirmation) => {
                confirmation.tx_file.get_or_insert(draft.tx_file);
                info!(wallet = %wallet, tx_id = %confirmation.tx_id, "transaction submitted");
                Ok(confirmation)
            }
            _ => Err(unexpected_payload(CommandKind::Send)),
        }
    }

    /// Runs `<binary> --help` to confirm the configured binary launches and
    /// exits cleanly.
    pub async fn health_check(&self) -> Result<(), CommandFailure> {
        let request = self.engine.command_line.health_check_request();
        let output = self
            .engine
            .invoker
            .invoke(&request)
            .await
            .map_err(CommandFailure::from)?;
        if output.success() {
            return Ok(());
        }

        let mut message = extract_error(&output.stderr);
        if message.is_empty() {
            message = format!("`{}` is not functional", request.rendered());
        }
        Err(CommandFailure::CommandFailed {
            exit_code: output.exit_code,
            message,
        })
    }

    /// Runs one refresh cycle immediately, outside the schedule.
    pub async fn refresh_now(
        &self,
        wallet: &WalletId,
    ) -> Result<Arc<WalletSnapshot>, CommandFailure> {
        let mut tip_known = false;
        for kind in REFRESH_COMMANDS {
            if kind == CommandKind::GetNetworkStatus && tip_known {
                continue;
            }
            if let CommandPayload::Balance(report) =
                self.execute(Command::new(kind, wallet.clone())).await?
            {
                tip_known = report.network.is_some();
            }
        }
        self.snapshot(wallet)
            .ok_or_else(|| CommandFailure::SessionClosed(wallet.clone()))
    }

    pub fn snapshot(&self, wallet: &WalletId) -> Option<Arc<WalletSnapshot>> {
        self.engine.cache.read(wallet)
    }

    pub fn lock_state(&self, wallet: &WalletId) -> LockState {
        self.engine.locks.state(wallet)
    }

    pub fn open_wallets(&self) -> Vec<WalletId> {
        self.engine.sessions.open_wallets()
    }

    pub fn subscribe(&self, wallet: WalletId) -> broadcast::Receiver<WalletEventEnvelope> {
        self.engine.bus.subscribe_wallet(wallet)
    }

    /// Like `subscribe`, but also hands back the last snapshot event so a
    /// late subscriber has a starting point.
    pub fn subscribe_with_latest(&self, wallet: WalletId) -> WalletSubscription {
        self.engine.bus.subscribe_wallet_with_latest(wallet)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<WalletEventEnvelope> {
        self.engine.bus.subscribe_all()
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop_all().await;
        for wallet in self.open_wallets() {
            self.engine.end_session(&wallet);
        }
    }

    /// Opens a session and runs its first command. A session created here
    /// is torn down again if that command fails.
    async fn start_session(&self, command: Command) -> CommandResult {
        let wallet = command.wallet.clone();
        let (_, fresh) = self.engine.begin_session(&wallet);
        match self.engine.execute(command, Origin::User).await {
            Ok(payload) => {
                self.scheduler.start(wallet.clone()).await;
                info!(wallet = %wallet, "wallet session opened");
                Ok(payload)
            }
            Err(error) => {
                if fresh {
                    self.close_wallet(&wallet).await;
                }
                Err(error)
            }
        }
    }
}

fn acknowledgement(payload: CommandPayload) -> Option<String> {
    match payload {
        CommandPayload::Acknowledged { message } => message,
        _ => None,
    }
}

fn unexpected_payload(kind: CommandKind) -> CommandFailure {
    CommandFailure::IncompleteResult {
        message: format!("unexpected payload for {}", kind.as_key()),
    }
}

fn validate_transfer(transfer: &TransferRequest) -> Result<(), CommandFailure> {
    if transfer.recipient.trim().is_empty() {
        return Err(CommandFailure::Configuration(
            "recipient address must not be empty".to_owned(),
        ));
    }
    if transfer.amount_nicks == 0 {
        return Err(CommandFailure::Configuration(
            "transfer amount must be greater than zero".to_owned(),
        ));
    }
    Ok(())
}
