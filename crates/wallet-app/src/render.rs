use std::time::SystemTime;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use wallet_orchestrator::{WalletEvent, WalletEventEnvelope, WalletSnapshot};
use wallet_protocol::{
    nicks_to_nock, BalanceReport, BlockSummary, NetworkStatus, SendConfirmation,
    TransactionDirection, TransactionRecord,
};

pub fn timestamp(at: SystemTime) -> String {
    OffsetDateTime::from(at)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown time".to_owned())
}

pub fn balance(report: &BalanceReport) -> String {
    let mut lines = vec![
        format!("Balance: {}", report.balance.formatted()),
        format!(
            "Total: {} nicks, available: {} nicks",
            report.balance.total_nicks, report.balance.available_nicks
        ),
    ];
    if let Some(network) = &report.network {
        lines.push(network_line(network));
    }
    lines.join("\n")
}

pub fn network(status: &NetworkStatus) -> String {
    let mut lines = vec![network_line(status)];
    if let Some(peers) = status.peers {
        lines.push(format!("Peers: {peers}"));
    }
    if let Some(connected) = status.connected {
        lines.push(format!(
            "Connected: {}",
            if connected { "yes" } else { "no" }
        ));
    }
    lines.join("\n")
}

fn network_line(status: &NetworkStatus) -> String {
    match &status.version {
        Some(version) => format!("Height: {} (version {version})", status.height),
        None => format!("Height: {}", status.height),
    }
}

pub fn transactions(records: &[TransactionRecord]) -> String {
    if records.is_empty() {
        return "No transactions.".to_owned();
    }
    records
        .iter()
        .map(transaction_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn transaction_line(record: &TransactionRecord) -> String {
    let sign = match record.direction {
        TransactionDirection::Incoming => '+',
        TransactionDirection::Outgoing => '-',
    };
    let mut line = format!(
        "{sign}{:.6} NOCK  {}",
        nicks_to_nock(record.amount_nicks),
        record.id
    );
    if let Some(counterparty) = &record.counterparty {
        line.push_str(&format!("  {counterparty}"));
    }
    line
}

pub fn send_confirmation(confirmation: &SendConfirmation) -> String {
    match &confirmation.tx_file {
        Some(tx_file) => format!("Transaction {} submitted ({tx_file})", confirmation.tx_id),
        None => format!("Transaction {} submitted", confirmation.tx_id),
    }
}

pub fn block(block: &BlockSummary) -> String {
    format!("Block {}: {}", block.height, block.hash)
}

pub fn acknowledgement(action: &str, message: Option<&str>) -> String {
    match message.map(str::trim).filter(|message| !message.is_empty()) {
        Some(message) => format!("{action}: {message}"),
        None => format!("{action}: done"),
    }
}

pub fn snapshot(snapshot: &WalletSnapshot) -> String {
    let mut parts = vec![format!("[rev {}]", snapshot.revision)];
    match snapshot.balance {
        Some(balance) => parts.push(balance.formatted()),
        None => parts.push("balance unknown".to_owned()),
    }
    if let Some(network) = &snapshot.network {
        parts.push(format!("height {}", network.height));
    }
    parts.push(format!("{} transactions", snapshot.transactions.len()));
    if let Some(stale_since) = snapshot.stale_since {
        parts.push(format!("stale since {}", timestamp(stale_since)));
    }
    parts.join(" | ")
}

pub fn event(envelope: &WalletEventEnvelope) -> String {
    let body = match &envelope.event {
        WalletEvent::SnapshotChanged { snapshot: current } => snapshot(current),
        WalletEvent::CommandFailed { command, error } => {
            format!("{} failed: {error}", command.as_key())
        }
        WalletEvent::RefreshFailed { command, error, .. } => {
            format!("refresh {} failed: {error}", command.as_key())
        }
        WalletEvent::RefreshSkipped => {
            "refresh skipped while a transaction is in progress".to_owned()
        }
        WalletEvent::SessionClosed => "session closed".to_owned(),
    };
    format!("#{} {}: {body}", envelope.sequence, envelope.wallet)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, UNIX_EPOCH};

    use wallet_orchestrator::{WalletEvent, WalletEventEnvelope, WalletSnapshot};
    use wallet_protocol::{
        Balance, BalanceReport, CommandFailure, CommandKind, NetworkStatus, TransactionDirection,
        TransactionRecord, WalletId,
    };

    #[test]
    fn balance_shows_nock_and_nicks() {
        let report = BalanceReport {
            balance: Balance {
                total_nicks: 131_072,
                available_nicks: 65_536,
            },
            network: Some(NetworkStatus {
                height: 1200,
                version: Some("0.1.9".to_owned()),
                ..NetworkStatus::default()
            }),
        };

        let rendered = super::balance(&report);
        assert!(rendered.contains("2.000000 NOCK"));
        assert!(rendered.contains("Total: 131072 nicks, available: 65536 nicks"));
        assert!(rendered.ends_with("Height: 1200 (version 0.1.9)"));
    }

    #[test]
    fn transactions_are_signed_by_direction() {
        let records = vec![
            TransactionRecord {
                id: "tx-in".to_owned(),
                amount_nicks: 65_536,
                direction: TransactionDirection::Incoming,
                timestamp: None,
                counterparty: None,
            },
            TransactionRecord {
                id: "tx-out".to_owned(),
                amount_nicks: 32_768,
                direction: TransactionDirection::Outgoing,
                timestamp: None,
                counterparty: Some("addr".to_owned()),
            },
        ];

        assert_eq!(
            super::transactions(&records),
            "+1.000000 NOCK  tx-in\n-0.500000 NOCK  tx-out  addr"
        );
        assert_eq!(super::transactions(&[]), "No transactions.");
    }

    #[test]
    fn timestamps_render_as_rfc3339() {
        let at = UNIX_EPOCH + Duration::from_secs(86_400);
        assert_eq!(super::timestamp(at), "1970-01-02T00:00:00Z");
    }

    #[test]
    fn stale_snapshots_say_since_when() {
        let mut snapshot = WalletSnapshot::empty(WalletId::new("main"));
        snapshot.revision = 3;
        snapshot.stale_since = Some(UNIX_EPOCH);

        assert_eq!(
            super::snapshot(&snapshot),
            "[rev 3] | balance unknown | 0 transactions | stale since 1970-01-01T00:00:00Z"
        );
    }

    #[test]
    fn events_carry_sequence_and_wallet() {
        let failed = WalletEventEnvelope {
            wallet: WalletId::new("main"),
            sequence: 7,
            published_at_monotonic_nanos: 0,
            event: WalletEvent::CommandFailed {
                command: CommandKind::Send,
                error: CommandFailure::CommandFailed {
                    exit_code: Some(1),
                    message: "insufficient funds".to_owned(),
                },
            },
        };
        assert_eq!(
            super::event(&failed),
            "#7 main: send failed: wallet command failed (exit code 1): insufficient funds"
        );

        let changed = WalletEventEnvelope {
            event: WalletEvent::SnapshotChanged {
                snapshot: Arc::new(WalletSnapshot::empty(WalletId::new("main"))),
            },
            ..failed
        };
        assert!(super::event(&changed).starts_with("#7 main: [rev 0]"));
    }
}
