use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use wallet_app::cli::{help_text, parse_cli_args, AppCommand, CliAction, CliInvocation};
use wallet_app::render;
use wallet_config::{config_path_from_env, load_from_path, persist_config, WalletConfig};
use wallet_orchestrator::{WalletEvent, WalletOrchestrator, WalletSnapshot};
use wallet_protocol::WalletId;

const LOG_FILE_NAME: &str = "nockwallet.log";

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = match parse_cli_args(std::env::args().skip(1))? {
        CliAction::Help => {
            println!("{}", help_text());
            return Ok(());
        }
        CliAction::Run(invocation) => invocation,
    };

    let config_path = match &invocation.config_path {
        Some(path) => path.clone(),
        None => config_path_from_env()?,
    };
    let mut config = load_from_path(&config_path)?;
    init_file_logging(&config_path)?;

    let wallet = resolve_wallet(&invocation, &mut config, &config_path)?;
    let mut session = config.session()?;
    if let AppCommand::Transactions {
        include_watch_only: true,
    } = invocation.command
    {
        session = session.with_include_watch_only(true);
    }
    tracing::info!(
        binary = %session.binary.display(),
        config = %config_path.display(),
        "starting nockwallet"
    );

    let orchestrator = WalletOrchestrator::new(session);
    let outcome = run(&orchestrator, invocation.command, wallet).await;
    orchestrator.shutdown().await;
    outcome
}

async fn run(
    orchestrator: &WalletOrchestrator,
    command: AppCommand,
    wallet: Option<WalletId>,
) -> Result<()> {
    let wallet = match (command.needs_wallet(), wallet) {
        (false, _) => {
            orchestrator
                .health_check()
                .await
                .context("wallet binary health check failed")?;
            println!(
                "Wallet binary OK: {}",
                orchestrator.session_config().binary.display()
            );
            return Ok(());
        }
        (true, Some(wallet)) => wallet,
        (true, None) => {
            return Err(anyhow!(
                "No wallet selected. Pass --wallet PATH once; it is remembered in the config."
            ))
        }
    };

    match &command {
        AppCommand::Create => {
            let message = orchestrator
                .create_wallet(wallet.clone())
                .await
                .with_context(|| format!("failed to create wallet {wallet}"))?;
            println!("{}", render::acknowledgement("Wallet created", message.as_deref()));
            return Ok(());
        }
        AppCommand::Import { keys_file } => {
            let message = orchestrator
                .import_wallet(wallet.clone(), keys_file.as_str())
                .await
                .with_context(|| format!("failed to import keys from {keys_file}"))?;
            println!("{}", render::acknowledgement("Keys imported", message.as_deref()));
            return Ok(());
        }
        _ => {}
    }

    let snapshot = orchestrator
        .open_wallet(wallet.clone())
        .await
        .with_context(|| format!("failed to open wallet {wallet}"))?;

    match command {
        // Opening already ran show-balance.
        AppCommand::Balance => {
            let report = match snapshot.balance_report() {
                Some(report) => report,
                None => orchestrator.balance(&wallet).await?,
            };
            println!("{}", render::balance(&report));
        }
        AppCommand::Transactions { .. } => {
            let transactions = orchestrator.transactions(&wallet).await?;
            println!("{}", render::transactions(&transactions));
        }
        AppCommand::Status => {
            let status = orchestrator.network_status(&wallet).await?;
            println!("{}", render::network(&status));
        }
        AppCommand::Send {
            recipient,
            amount_nicks,
            fee_nicks,
            note_names,
        } => {
            let mut transfer = orchestrator.transfer(recipient, amount_nicks);
            if let Some(fee_nicks) = fee_nicks {
                transfer.fee_nicks = fee_nicks;
            }
            transfer.note_names = note_names;
            let confirmation = orchestrator
                .send(&wallet, transfer)
                .await
                .context("send failed")?;
            println!("{}", render::send_confirmation(&confirmation));
        }
        AppCommand::Export { output } => {
            let message = orchestrator
                .export_keys(&wallet, output.clone())
                .await
                .with_context(|| format!("failed to export keys to {output}"))?;
            println!("{}", render::acknowledgement("Keys exported", message.as_deref()));
        }
        AppCommand::Block { height } => {
            let block = orchestrator.block(&wallet, height).await?;
            println!("{}", render::block(&block));
        }
        AppCommand::Watch { ticks } => watch(orchestrator, &wallet, &snapshot, ticks).await?,
        AppCommand::Create | AppCommand::Import { .. } | AppCommand::Check => {}
    }

    Ok(())
}

/// Prints wallet events until `ticks` snapshots have been shown or the user
/// interrupts.
async fn watch(
    orchestrator: &WalletOrchestrator,
    wallet: &WalletId,
    opened: &WalletSnapshot,
    ticks: Option<u64>,
) -> Result<()> {
    let subscription = orchestrator.subscribe_with_latest(wallet.clone());
    let mut events = subscription.events;
    let mut remaining = ticks;
    println!(
        "Watching {wallet} every {}s (Ctrl-C to stop)",
        orchestrator.session_config().refresh_interval.as_secs()
    );
    match subscription.latest.as_ref().and_then(|latest| latest.event.snapshot()) {
        Some(latest) => println!("{}", render::snapshot(latest)),
        None => println!("{}", render::snapshot(opened)),
    }

    loop {
        if remaining == Some(0) {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            received = events.recv() => match received {
                Ok(envelope) => {
                    println!("{}", render::event(&envelope));
                    if matches!(envelope.event, WalletEvent::SnapshotChanged { .. }) {
                        remaining = remaining.map(|left| left.saturating_sub(1));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(wallet = %wallet, skipped, "watch subscriber lagged");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn resolve_wallet(
    invocation: &CliInvocation,
    config: &mut WalletConfig,
    config_path: &Path,
) -> Result<Option<WalletId>> {
    if let Some(wallet) = &invocation.wallet {
        if config.wallet_path.as_deref() != Some(wallet.as_str()) {
            config.wallet_path = Some(wallet.clone());
            persist_config(config_path, config)?;
        }
    }
    Ok(config.wallet_path.clone().map(WalletId::new))
}

fn init_file_logging(config_path: &Path) -> Result<()> {
    let log_path = log_file_path(config_path);
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create nockwallet log directory '{}'",
                    parent.display()
                )
            })?;
        }
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open nockwallet log file '{}'", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(log_file))
        .init();

    Ok(())
}

fn log_file_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(LOG_FILE_NAME)
}
