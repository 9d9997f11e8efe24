use wallet_protocol::{
    Balance, BalanceReport, CommandKind, CommandPayload, NetworkStatus, SendConfirmation,
    TransactionDirection, TransactionDraft, TransactionRecord,
};

const TX_ID_LEN: usize = 44;
const NOTE_ID_MIN_LEN: usize = 40;

pub(crate) enum TextOutcome {
    Parsed(CommandPayload),
    Incomplete(String),
    Unrecognized,
}

/// Line-oriented fallback for the human-readable reports `nockchain-wallet`
/// prints when it is not asked for JSON.
pub(crate) fn parse_payload(kind: CommandKind, output: &str) -> TextOutcome {
    match kind {
        CommandKind::OpenWallet | CommandKind::GetBalance => balance(output),
        CommandKind::GetNetworkStatus => network_status(output),
        CommandKind::ListTransactions => notes(output),
        CommandKind::CreateTransaction => output
            .lines()
            .map(str::trim)
            .find(|line| line.ends_with(".tx"))
            .map(|tx_file| {
                TextOutcome::Parsed(CommandPayload::TransactionDraft(TransactionDraft {
                    tx_file: tx_file.to_owned(),
                }))
            })
            .unwrap_or(TextOutcome::Unrecognized),
        CommandKind::Send => output
            .lines()
            .map(str::trim)
            .find(|line| line.chars().count() == TX_ID_LEN && !line.contains(char::is_whitespace))
            .map(|tx_id| {
                TextOutcome::Parsed(CommandPayload::SendConfirmation(SendConfirmation {
                    tx_id: tx_id.to_owned(),
                    tx_file: None,
                }))
            })
            .unwrap_or(TextOutcome::Unrecognized),
        _ => TextOutcome::Unrecognized,
    }
}

fn balance(output: &str) -> TextOutcome {
    let total = labelled_number(output, "Total:", &[',']);
    let available = labelled_number(output, "Available:", &[',']);
    let height = labelled_number(output, "Height:", &[',', '.']);
    let version = version(output);

    let total_nicks = match total {
        Some(Some(total)) => total,
        Some(None) => {
            return TextOutcome::Incomplete("`Total` is not a whole number of nicks".to_owned())
        }
        None if available.is_some() || height.is_some() || version.is_some() => {
            return TextOutcome::Incomplete("missing required field `Total`".to_owned())
        }
        None => return TextOutcome::Unrecognized,
    };

    let network = height.flatten().map(|height| NetworkStatus {
        height,
        version,
        peers: None,
        connected: None,
    });

    TextOutcome::Parsed(CommandPayload::Balance(BalanceReport {
        balance: Balance {
            total_nicks,
            available_nicks: available.flatten().unwrap_or(0),
        },
        network,
    }))
}

fn network_status(output: &str) -> TextOutcome {
    let height = labelled_number(output, "Height:", &[',', '.']);
    let version = version(output);

    match height {
        Some(Some(height)) => TextOutcome::Parsed(CommandPayload::NetworkStatus(NetworkStatus {
            height,
            version,
            peers: None,
            connected: None,
        })),
        Some(None) => TextOutcome::Incomplete("`Height` is not a whole number".to_owned()),
        None if version.is_some() || output.contains("Total:") => {
            TextOutcome::Incomplete("missing required field `Height`".to_owned())
        }
        None => TextOutcome::Unrecognized,
    }
}

/// `list-notes` prints one note per line. Any line with a run of at least 40
/// lowercase hex characters is a note; headers and blank lines are skipped.
/// Notes are unspent outputs the wallet holds, so they are recorded as
/// incoming.
fn notes(output: &str) -> TextOutcome {
    let records = output
        .lines()
        .filter_map(|line| {
            let id = note_id(line)?;
            Some(TransactionRecord {
                id: id.to_owned(),
                amount_nicks: note_amount(line).unwrap_or(0),
                direction: TransactionDirection::Incoming,
                timestamp: None,
                counterparty: None,
            })
        })
        .collect::<Vec<_>>();

    if records.is_empty() && !output.to_ascii_lowercase().contains("note") {
        return TextOutcome::Unrecognized;
    }
    TextOutcome::Parsed(CommandPayload::Transactions(records))
}

fn note_id(line: &str) -> Option<&str> {
    let mut start = None;
    for (index, c) in line.char_indices().chain(std::iter::once((line.len(), ' '))) {
        if matches!(c, '0'..='9' | 'a'..='f') {
            start.get_or_insert(index);
        } else if let Some(begin) = start.take() {
            if index - begin >= NOTE_ID_MIN_LEN {
                return Some(&line[begin..index]);
            }
        }
    }
    None
}

fn note_amount(line: &str) -> Option<u64> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    tokens.windows(2).find_map(|pair| {
        if pair[1].starts_with("nick") {
            pair[0].replace(',', "").parse::<u64>().ok()
        } else {
            None
        }
    })
}

/// `None` when the label is absent, `Some(None)` when it is present but the
/// value does not parse.
fn labelled_number(output: &str, label: &str, separators: &[char]) -> Option<Option<u64>> {
    let rest = output
        .lines()
        .find_map(|line| line.find(label).map(|index| &line[index + label.len()..]))?;
    let digits = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || separators.contains(c))
        .filter(|c| c.is_ascii_digit())
        .collect::<String>();
    Some(digits.parse::<u64>().ok())
}

fn version(output: &str) -> Option<String> {
    let rest = output.lines().find_map(|line| {
        line.find("Version:")
            .map(|index| &line[index + "Version:".len()..])
    })?;
    let candidate = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect::<String>();
    let parts = candidate.split('.').collect::<Vec<_>>();
    if parts.len() == 3 && parts.iter().all(|part| !part.is_empty()) {
        Some(candidate)
    } else {
        None
    }
}
