use serde::{Deserialize, Serialize};

use crate::error::CommandFailure;

pub const NICKS_PER_NOCK: u64 = 65_536;

pub fn nicks_to_nock(nicks: u64) -> f64 {
    nicks as f64 / NICKS_PER_NOCK as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total_nicks: u64,
    pub available_nicks: u64,
}

impl Balance {
    pub fn total_nock(&self) -> f64 {
        nicks_to_nock(self.total_nicks)
    }

    pub fn available_nock(&self) -> f64 {
        nicks_to_nock(self.available_nicks)
    }

    pub fn formatted(&self) -> String {
        format!(
            "{:.6} NOCK ({:.6} available)",
            self.total_nock(),
            self.available_nock()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub height: u64,
    pub version: Option<String>,
    pub peers: Option<u32>,
    pub connected: Option<bool>,
}

/// A balance reply. `show-balance` also reports chain height and wallet
/// version, which ride along when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub balance: Balance,
    pub network: Option<NetworkStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionDirection {
    Incoming,
    Outgoing,
}

impl TransactionDirection {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "incoming" | "in" | "received" => Some(Self::Incoming),
            "outgoing" | "out" | "sent" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub amount_nicks: u64,
    pub direction: TransactionDirection,
    pub timestamp: Option<u64>,
    pub counterparty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDraft {
    pub tx_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendConfirmation {
    pub tx_id: String,
    pub tx_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    Balance(BalanceReport),
    Transactions(Vec<TransactionRecord>),
    NetworkStatus(NetworkStatus),
    TransactionDraft(TransactionDraft),
    SendConfirmation(SendConfirmation),
    Block(BlockSummary),
    Acknowledged { message: Option<String> },
}

pub type CommandResult = Result<CommandPayload, CommandFailure>;
