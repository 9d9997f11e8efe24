//! Classifies raw wallet binary output into typed payloads or structured
//! failures. Everything here is pure: identical input yields identical
//! results.

mod json;
mod stderr;
mod text;

use serde_json::Value;
use wallet_invoker::ProcessOutput;
use wallet_protocol::{CommandFailure, CommandKind, CommandPayload, CommandResult};

pub use stderr::extract_error;

/// Upper bound on raw output kept in `MalformedOutput` diagnostics.
pub const MAX_EXCERPT_CHARS: usize = 500;

pub fn parse_response(kind: CommandKind, output: &ProcessOutput) -> CommandResult {
    if !output.success() {
        return Err(command_failed(output));
    }

    if is_acknowledgement(kind) {
        return Ok(acknowledgement(&output.stdout));
    }

    let stdout = output.stdout.trim();
    if stdout.is_empty() {
        return Err(malformed("empty output", &output.stdout));
    }

    match serde_json::from_str::<Value>(stdout) {
        Ok(value) => json::parse_payload(kind, &value).map_err(|error| match error {
            json::ShapeError::Malformed(reason) => malformed(&reason, &output.stdout),
            json::ShapeError::Incomplete(message) => CommandFailure::IncompleteResult { message },
        }),
        Err(_) => match text::parse_payload(kind, stdout) {
            text::TextOutcome::Parsed(payload) => Ok(payload),
            text::TextOutcome::Incomplete(message) => {
                Err(CommandFailure::IncompleteResult { message })
            }
            text::TextOutcome::Unrecognized => Err(malformed(
                &format!("expected JSON output for {}", kind.as_key()),
                &output.stdout,
            )),
        },
    }
}

pub fn excerpt(raw: &str) -> String {
    raw.chars().take(MAX_EXCERPT_CHARS).collect()
}

fn is_acknowledgement(kind: CommandKind) -> bool {
    matches!(
        kind,
        CommandKind::CreateWallet | CommandKind::ImportWallet | CommandKind::ExportKeys
    )
}

fn acknowledgement(stdout: &str) -> CommandPayload {
    let trimmed = stdout.trim();
    let message = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ if trimmed.is_empty() => None,
        _ => Some(trimmed.to_owned()),
    };
    CommandPayload::Acknowledged { message }
}

fn command_failed(output: &ProcessOutput) -> CommandFailure {
    let stderr = extract_error(&output.stderr);
    let message = if !stderr.is_empty() {
        stderr
    } else {
        let stdout = extract_error(&output.stdout);
        if !stdout.is_empty() {
            stdout
        } else {
            match output.exit_code {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_owned(),
            }
        }
    };

    CommandFailure::CommandFailed {
        exit_code: output.exit_code,
        message,
    }
}

fn malformed(reason: &str, raw: &str) -> CommandFailure {
    CommandFailure::MalformedOutput {
        reason: reason.to_owned(),
        excerpt: excerpt(raw),
    }
}

#[cfg(test)]
mod tests {
    use wallet_invoker::ProcessOutput;
    use wallet_protocol::{
        Balance, BalanceReport, CommandFailure, CommandKind, CommandPayload, FailureKind,
        NetworkStatus, SendConfirmation, TransactionDirection, TransactionDraft,
    };

    use super::{parse_response, MAX_EXCERPT_CHARS};

    fn ok(stdout: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_owned(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    fn failed(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.to_owned(),
            stderr: stderr.to_owned(),
            exit_code: Some(code),
        }
    }

    #[test]
    fn non_zero_exit_uses_stderr_regardless_of_stdout() {
        let result = parse_response(
            CommandKind::Send,
            &failed(1, "{\"tx_id\": \"abc\"}", "insufficient funds\n"),
        );
        assert_eq!(
            result,
            Err(CommandFailure::CommandFailed {
                exit_code: Some(1),
                message: "insufficient funds".to_owned(),
            })
        );
    }

    #[test]
    fn non_zero_exit_falls_back_to_stdout_then_exit_status() {
        let from_stdout = parse_response(CommandKind::GetBalance, &failed(2, "wallet locked", ""));
        assert_eq!(
            from_stdout,
            Err(CommandFailure::CommandFailed {
                exit_code: Some(2),
                message: "wallet locked".to_owned(),
            })
        );

        let bare = parse_response(CommandKind::GetBalance, &failed(4, "", "  "));
        assert_eq!(
            bare,
            Err(CommandFailure::CommandFailed {
                exit_code: Some(4),
                message: "exit status 4".to_owned(),
            })
        );
    }

    #[test]
    fn signal_exit_is_command_failed_without_code() {
        let output = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        };
        let failure = parse_response(CommandKind::GetBalance, &output).expect_err("must fail");
        assert_eq!(
            failure,
            CommandFailure::CommandFailed {
                exit_code: None,
                message: "terminated by signal".to_owned(),
            }
        );
    }

    #[test]
    fn not_json_balance_is_malformed_with_raw_excerpt() {
        let failure =
            parse_response(CommandKind::GetBalance, &ok("not json")).expect_err("must fail");
        assert_eq!(failure.kind(), FailureKind::MalformedOutput);
        assert_eq!(failure.excerpt(), Some("not json"));
    }

    #[test]
    fn empty_output_for_data_commands_is_malformed() {
        for kind in [
            CommandKind::GetBalance,
            CommandKind::ListTransactions,
            CommandKind::GetNetworkStatus,
            CommandKind::Send,
        ] {
            let failure = parse_response(kind, &ok("\n")).expect_err("must fail");
            assert_eq!(failure.kind(), FailureKind::MalformedOutput, "{kind:?}");
        }
    }

    #[test]
    fn malformed_excerpt_is_bounded() {
        let noise = "x".repeat(MAX_EXCERPT_CHARS * 3);
        let failure = parse_response(CommandKind::GetBalance, &ok(&noise)).expect_err("must fail");
        assert_eq!(
            failure.excerpt().map(|excerpt| excerpt.chars().count()),
            Some(MAX_EXCERPT_CHARS)
        );
    }

    #[test]
    fn json_balance_parses_and_defaults_available_to_total() {
        let payload = parse_response(
            CommandKind::GetBalance,
            &ok(r#"{"total_nicks": 131072, "height": 4410, "version": "0.1.4"}"#),
        )
        .expect("balance should parse");

        assert_eq!(
            payload,
            CommandPayload::Balance(BalanceReport {
                balance: Balance {
                    total_nicks: 131_072,
                    available_nicks: 131_072,
                },
                network: Some(NetworkStatus {
                    height: 4410,
                    version: Some("0.1.4".to_owned()),
                    peers: None,
                    connected: None,
                }),
            })
        );
    }

    #[test]
    fn json_balance_missing_or_negative_total_is_incomplete() {
        let missing = parse_response(CommandKind::GetBalance, &ok(r#"{"available_nicks": 3}"#))
            .expect_err("must fail");
        assert_eq!(
            missing,
            CommandFailure::IncompleteResult {
                message: "missing required field `total_nicks`".to_owned(),
            }
        );

        let negative = parse_response(CommandKind::GetBalance, &ok(r#"{"total_nicks": -5}"#))
            .expect_err("must fail");
        assert_eq!(negative.kind(), FailureKind::IncompleteResult);
    }

    #[test]
    fn json_of_the_wrong_shape_is_malformed() {
        let failure = parse_response(CommandKind::GetBalance, &ok("[1, 2, 3]")).expect_err("must fail");
        assert_eq!(failure.kind(), FailureKind::MalformedOutput);
        assert_eq!(failure.excerpt(), Some("[1, 2, 3]"));
    }

    #[test]
    fn text_balance_matches_wallet_cli_report() {
        let report = "Wallet Version: 0.1.4\nHeight: 12,345\nTotal: 1,310,720 nicks\nAvailable: 655,360 nicks\n";
        let payload = parse_response(CommandKind::GetBalance, &ok(report)).expect("parse");

        let CommandPayload::Balance(report) = payload else {
            panic!("expected balance payload");
        };
        assert_eq!(report.balance.total_nicks, 1_310_720);
        assert_eq!(report.balance.available_nicks, 655_360);
        let network = report.network.expect("height should be captured");
        assert_eq!(network.height, 12_345);
        assert_eq!(network.version.as_deref(), Some("0.1.4"));
    }

    #[test]
    fn text_balance_without_total_is_incomplete() {
        let failure = parse_response(CommandKind::GetBalance, &ok("Available: 10 nicks"))
            .expect_err("must fail");
        assert_eq!(failure.kind(), FailureKind::IncompleteResult);
    }

    #[test]
    fn text_network_status_reads_height() {
        let payload = parse_response(CommandKind::GetNetworkStatus, &ok("Height: 1.024.000"))
            .expect("parse");
        assert_eq!(
            payload,
            CommandPayload::NetworkStatus(NetworkStatus {
                height: 1_024_000,
                version: None,
                peers: None,
                connected: None,
            })
        );
    }

    #[test]
    fn transactions_require_id_amount_and_direction() {
        let payload = parse_response(
            CommandKind::ListTransactions,
            &ok(r#"{"transactions": [
                {"id": "tx-2", "amount": 70, "direction": "outgoing", "timestamp": 1700000100},
                {"id": "tx-1", "amount": 100, "direction": "incoming", "counterparty": "abc"}
            ]}"#),
        )
        .expect("parse");

        let CommandPayload::Transactions(transactions) = payload else {
            panic!("expected transactions payload");
        };
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].id, "tx-2");
        assert_eq!(transactions[0].direction, TransactionDirection::Outgoing);
        assert_eq!(transactions[0].timestamp, Some(1_700_000_100));
        assert_eq!(transactions[1].counterparty.as_deref(), Some("abc"));

        let missing_direction = parse_response(
            CommandKind::ListTransactions,
            &ok(r#"[{"id": "tx-1", "amount": 100}]"#),
        )
        .expect_err("must fail");
        assert_eq!(
            missing_direction,
            CommandFailure::IncompleteResult {
                message: "transaction entry 0: missing required field `direction`".to_owned(),
            }
        );
    }

    #[test]
    fn list_notes_text_yields_one_record_per_hex_line() {
        let first = format!("{}0011", "a3f9".repeat(10));
        let second = format!("{}0022", "b3f9".repeat(10));
        let output = format!("Notes:\n  {first}\n\n  {second}  65,536 nicks\n");

        let payload = parse_response(CommandKind::ListTransactions, &ok(&output)).expect("parse");

        let CommandPayload::Transactions(notes) = payload else {
            panic!("expected transactions payload");
        };
        assert_eq!(
            notes.iter().map(|note| note.id.as_str()).collect::<Vec<_>>(),
            vec![first.as_str(), second.as_str()]
        );
        assert_eq!(notes[0].amount_nicks, 0);
        assert_eq!(notes[1].amount_nicks, 65_536);
        assert!(notes
            .iter()
            .all(|note| note.direction == TransactionDirection::Incoming));
    }

    #[test]
    fn list_notes_text_without_notes_is_an_empty_list() {
        let payload = parse_response(CommandKind::ListTransactions, &ok("No notes found.\n"))
            .expect("parse");
        assert_eq!(payload, CommandPayload::Transactions(Vec::new()));

        let garbage = parse_response(CommandKind::ListTransactions, &ok("segfault at 0x0"))
            .expect_err("must fail");
        assert_eq!(garbage.kind(), FailureKind::MalformedOutput);
    }

    #[test]
    fn empty_transaction_list_is_valid() {
        let payload = parse_response(CommandKind::ListTransactions, &ok("[]")).expect("parse");
        assert_eq!(payload, CommandPayload::Transactions(Vec::new()));
    }

    #[test]
    fn create_transaction_reads_tx_file_from_json_or_text() {
        let from_json = parse_response(
            CommandKind::CreateTransaction,
            &ok(r#"{"tx_file": "txs/2a9f.tx"}"#),
        )
        .expect("parse");
        let from_text = parse_response(
            CommandKind::CreateTransaction,
            &ok("Building transaction...\ntxs/2a9f.tx\n"),
        )
        .expect("parse");

        let expected = CommandPayload::TransactionDraft(TransactionDraft {
            tx_file: "txs/2a9f.tx".to_owned(),
        });
        assert_eq!(from_json, expected);
        assert_eq!(from_text, expected);
    }

    #[test]
    fn send_reads_tx_id_from_json_or_44_char_line() {
        let tx_id = "A".repeat(44);
        let from_text = parse_response(
            CommandKind::Send,
            &ok(&format!("Sending transaction\n{tx_id}\ndone")),
        )
        .expect("parse");
        assert_eq!(
            from_text,
            CommandPayload::SendConfirmation(SendConfirmation {
                tx_id: tx_id.clone(),
                tx_file: None,
            })
        );

        let incomplete = parse_response(CommandKind::Send, &ok(r#"{"status": "ok"}"#))
            .expect_err("must fail");
        assert_eq!(incomplete.kind(), FailureKind::IncompleteResult);
    }

    #[test]
    fn lifecycle_commands_accept_any_successful_output() {
        assert_eq!(
            parse_response(CommandKind::CreateWallet, &ok("")),
            Ok(CommandPayload::Acknowledged { message: None })
        );
        assert_eq!(
            parse_response(
                CommandKind::ImportWallet,
                &ok("Keys imported successfully\n")
            ),
            Ok(CommandPayload::Acknowledged {
                message: Some("Keys imported successfully".to_owned()),
            })
        );
    }

    #[test]
    fn parsing_is_deterministic() {
        let output = ok(r#"{"total_nicks": 9}"#);
        assert_eq!(
            parse_response(CommandKind::GetBalance, &output),
            parse_response(CommandKind::GetBalance, &output)
        );
    }
}
