use serde::{Deserialize, Serialize};

use crate::ids::WalletId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandAccess {
    ReadOnly,
    Mutating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    CreateWallet,
    OpenWallet,
    ImportWallet,
    GetBalance,
    ListTransactions,
    CreateTransaction,
    Send,
    GetNetworkStatus,
    ExportKeys,
    GetBlock,
}

impl CommandKind {
    pub const ALL: [CommandKind; 10] = [
        Self::CreateWallet,
        Self::OpenWallet,
        Self::ImportWallet,
        Self::GetBalance,
        Self::ListTransactions,
        Self::CreateTransaction,
        Self::Send,
        Self::GetNetworkStatus,
        Self::ExportKeys,
        Self::GetBlock,
    ];

    pub const fn access(self) -> CommandAccess {
        match self {
            Self::CreateWallet | Self::ImportWallet | Self::CreateTransaction | Self::Send => {
                CommandAccess::Mutating
            }
            Self::OpenWallet
            | Self::GetBalance
            | Self::ListTransactions
            | Self::GetNetworkStatus
            | Self::ExportKeys
            | Self::GetBlock => CommandAccess::ReadOnly,
        }
    }

    pub const fn is_mutating(self) -> bool {
        matches!(self.access(), CommandAccess::Mutating)
    }

    /// Stable key used in configuration tables and log fields.
    pub const fn as_key(self) -> &'static str {
        match self {
            Self::CreateWallet => "create_wallet",
            Self::OpenWallet => "open_wallet",
            Self::ImportWallet => "import_wallet",
            Self::GetBalance => "get_balance",
            Self::ListTransactions => "list_transactions",
            Self::CreateTransaction => "create_transaction",
            Self::Send => "send",
            Self::GetNetworkStatus => "get_network_status",
            Self::ExportKeys => "export_keys",
            Self::GetBlock => "get_block",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_key() == key)
    }

    /// Subcommand understood by `nockchain-wallet` for this kind.
    pub const fn default_subcommand(self) -> &'static str {
        match self {
            Self::CreateWallet => "keygen",
            Self::OpenWallet | Self::GetBalance | Self::GetNetworkStatus => "show-balance",
            Self::ImportWallet => "import-keys",
            Self::ListTransactions => "list-notes",
            Self::CreateTransaction => "create-tx",
            Self::Send => "send-tx",
            Self::ExportKeys => "export-keys",
            Self::GetBlock => "get-block",
        }
    }

    /// Whether the invocation carries `--wallet <path>`.
    pub const fn targets_wallet_file(self) -> bool {
        !matches!(self, Self::GetBlock | Self::GetNetworkStatus)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub recipient: String,
    pub amount_nicks: u64,
    pub fee_nicks: u64,
    pub note_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
    pub wallet: WalletId,
}

impl Command {
    pub fn new(kind: CommandKind, wallet: WalletId) -> Self {
        Self {
            kind,
            args: Vec::new(),
            wallet,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn access(&self) -> CommandAccess {
        self.kind.access()
    }

    pub fn is_mutating(&self) -> bool {
        self.kind.is_mutating()
    }

    pub fn create_wallet(wallet: WalletId) -> Self {
        Self::new(CommandKind::CreateWallet, wallet)
    }

    pub fn open_wallet(wallet: WalletId) -> Self {
        Self::new(CommandKind::OpenWallet, wallet)
    }

    pub fn import_wallet(wallet: WalletId, keys_file: impl Into<String>) -> Self {
        Self::new(CommandKind::ImportWallet, wallet)
            .with_args(["--file".to_owned(), keys_file.into()])
    }

    pub fn get_balance(wallet: WalletId) -> Self {
        Self::new(CommandKind::GetBalance, wallet)
    }

    pub fn list_transactions(wallet: WalletId) -> Self {
        Self::new(CommandKind::ListTransactions, wallet)
    }

    pub fn network_status(wallet: WalletId) -> Self {
        Self::new(CommandKind::GetNetworkStatus, wallet)
    }

    pub fn create_transaction(wallet: WalletId, request: &TransferRequest) -> Self {
        let mut args = vec![
            "--recipient".to_owned(),
            format!("{}:{}", request.recipient, request.amount_nicks),
            "--fee".to_owned(),
            request.fee_nicks.to_string(),
        ];
        let names = request
            .note_names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect::<Vec<_>>();
        if !names.is_empty() {
            args.push("--names".to_owned());
            args.push(format!("[{}]", names.join(" ")));
        }
        Self::new(CommandKind::CreateTransaction, wallet).with_args(args)
    }

    pub fn send_transaction(wallet: WalletId, tx_file: impl Into<String>) -> Self {
        Self::new(CommandKind::Send, wallet).with_args([tx_file.into()])
    }

    pub fn export_keys(wallet: WalletId, output: impl Into<String>) -> Self {
        Self::new(CommandKind::ExportKeys, wallet)
            .with_args(["--output".to_owned(), output.into()])
    }

    pub fn get_block(wallet: WalletId, height: u64) -> Self {
        Self::new(CommandKind::GetBlock, wallet)
            .with_args(["--height".to_owned(), height.to_string()])
    }
}
