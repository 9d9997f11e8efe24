//! Types shared by every layer of the wallet orchestration core: wallet
//! identities, typed commands, reply payloads and the failure taxonomy.

pub mod command;
pub mod error;
pub mod ids;
pub mod payload;

pub use command::{Command, CommandAccess, CommandKind, TransferRequest};
pub use error::{CommandFailure, FailureKind};
pub use ids::WalletId;
pub use payload::{
    nicks_to_nock, Balance, BalanceReport, BlockSummary, CommandPayload, CommandResult,
    NetworkStatus, SendConfirmation, TransactionDirection, TransactionDraft, TransactionRecord,
    NICKS_PER_NOCK,
};
