use serde_json::{Map, Value};
use wallet_protocol::{
    Balance, BalanceReport, BlockSummary, CommandKind, CommandPayload, NetworkStatus,
    SendConfirmation, TransactionDirection, TransactionDraft, TransactionRecord,
};

pub(crate) enum ShapeError {
    Malformed(String),
    Incomplete(String),
}

type ShapeResult<T> = Result<T, ShapeError>;

pub(crate) fn parse_payload(kind: CommandKind, value: &Value) -> ShapeResult<CommandPayload> {
    match kind {
        CommandKind::OpenWallet | CommandKind::GetBalance => {
            balance_report(expect_object(value)?).map(CommandPayload::Balance)
        }
        CommandKind::GetNetworkStatus => {
            network_status(expect_object(value)?).map(CommandPayload::NetworkStatus)
        }
        CommandKind::ListTransactions => transactions(value).map(CommandPayload::Transactions),
        CommandKind::CreateTransaction => {
            let object = expect_object(value)?;
            Ok(CommandPayload::TransactionDraft(TransactionDraft {
                tx_file: required_string(object, "tx_file")?,
            }))
        }
        CommandKind::Send => {
            let object = expect_object(value)?;
            Ok(CommandPayload::SendConfirmation(SendConfirmation {
                tx_id: required_string(object, "tx_id")?,
                tx_file: optional_string(object, "tx_file")?,
            }))
        }
        CommandKind::GetBlock => {
            let object = expect_object(value)?;
            Ok(CommandPayload::Block(BlockSummary {
                height: required_u64(object, "height")?,
                hash: required_string(object, "hash")?,
            }))
        }
        CommandKind::CreateWallet | CommandKind::ImportWallet | CommandKind::ExportKeys => {
            Ok(CommandPayload::Acknowledged {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            })
        }
    }
}

fn balance_report(object: &Map<String, Value>) -> ShapeResult<BalanceReport> {
    let total_nicks = required_u64(object, "total_nicks")?;
    let available_nicks = optional_u64(object, "available_nicks")?.unwrap_or(total_nicks);
    let network = match optional_u64(object, "height")? {
        Some(height) => Some(NetworkStatus {
            height,
            version: optional_string(object, "version")?,
            peers: None,
            connected: None,
        }),
        None => None,
    };

    Ok(BalanceReport {
        balance: Balance {
            total_nicks,
            available_nicks,
        },
        network,
    })
}

fn network_status(object: &Map<String, Value>) -> ShapeResult<NetworkStatus> {
    let peers = match optional_u64(object, "peers")? {
        Some(peers) => Some(u32::try_from(peers).map_err(|_| {
            ShapeError::Incomplete("field `peers` is out of range".to_owned())
        })?),
        None => None,
    };
    let connected = match object.get("connected") {
        None | Some(Value::Null) => None,
        Some(Value::Bool(value)) => Some(*value),
        Some(_) => {
            return Err(ShapeError::Incomplete(
                "field `connected` must be a boolean".to_owned(),
            ))
        }
    };

    Ok(NetworkStatus {
        height: required_u64(object, "height")?,
        version: optional_string(object, "version")?,
        peers,
        connected,
    })
}

fn transactions(value: &Value) -> ShapeResult<Vec<TransactionRecord>> {
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(object) => match object.get("transactions") {
            Some(Value::Array(entries)) => entries,
            Some(_) => {
                return Err(ShapeError::Incomplete(
                    "field `transactions` must be an array".to_owned(),
                ))
            }
            None => return Err(missing("transactions")),
        },
        _ => {
            return Err(ShapeError::Malformed(
                "expected a JSON array of transactions".to_owned(),
            ))
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| transaction(index, entry))
        .collect()
}

fn transaction(index: usize, entry: &Value) -> ShapeResult<TransactionRecord> {
    let object = entry.as_object().ok_or_else(|| {
        ShapeError::Incomplete(format!("transaction entry {index} is not an object"))
    })?;
    let in_entry = |error: ShapeError| match error {
        ShapeError::Incomplete(message) => {
            ShapeError::Incomplete(format!("transaction entry {index}: {message}"))
        }
        other => other,
    };

    let id = match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.trim().to_owned(),
        Some(Value::Number(id)) => id.to_string(),
        Some(_) => return Err(in_entry(invalid("id", "a non-empty string"))),
        None => return Err(in_entry(missing("id"))),
    };
    let amount_nicks = required_u64(object, "amount").map_err(in_entry)?;
    let direction = match object.get("direction") {
        Some(Value::String(raw)) => TransactionDirection::parse(raw).ok_or_else(|| {
            in_entry(invalid("direction", "`incoming` or `outgoing`"))
        })?,
        Some(_) => return Err(in_entry(invalid("direction", "a string"))),
        None => return Err(in_entry(missing("direction"))),
    };

    Ok(TransactionRecord {
        id,
        amount_nicks,
        direction,
        timestamp: optional_u64(object, "timestamp").map_err(in_entry)?,
        counterparty: optional_string(object, "counterparty").map_err(in_entry)?,
    })
}

fn expect_object(value: &Value) -> ShapeResult<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ShapeError::Malformed("expected a JSON object".to_owned()))
}

fn required_u64(object: &Map<String, Value>, field: &str) -> ShapeResult<u64> {
    optional_u64(object, field)?.ok_or_else(|| missing(field))
}

fn optional_u64(object: &Map<String, Value>, field: &str) -> ShapeResult<Option<u64>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(field, "a non-negative integer")),
        // Large amounts are sometimes emitted as strings to dodge float precision.
        Some(Value::String(raw)) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(field, "a non-negative integer")),
        Some(_) => Err(invalid(field, "a non-negative integer")),
    }
}

fn required_string(object: &Map<String, Value>, field: &str) -> ShapeResult<String> {
    optional_string(object, field)?.ok_or_else(|| missing(field))
}

fn optional_string(object: &Map<String, Value>, field: &str) -> ShapeResult<Option<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => Ok(Some(raw.trim().to_owned())),
        Some(_) => Err(invalid(field, "a string")),
    }
}

fn missing(field: &str) -> ShapeError {
    ShapeError::Incomplete(format!("missing required field `{field}`"))
}

fn invalid(field: &str, expected: &str) -> ShapeError {
    ShapeError::Incomplete(format!("field `{field}` must be {expected}"))
}
