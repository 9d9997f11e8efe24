use thiserror::Error;

use crate::ids::WalletId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ProcessLaunch,
    ProcessTimeout,
    CommandFailed,
    MalformedOutput,
    IncompleteResult,
    SessionNotOpen,
    SessionClosed,
    Configuration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandFailure {
    #[error("failed to launch wallet binary: {message}")]
    ProcessLaunch { message: String },
    #[error("wallet command timed out after {timeout_ms} ms")]
    ProcessTimeout { timeout_ms: u64 },
    #[error("wallet command failed ({}): {message}", exit_code_label(.exit_code))]
    CommandFailed {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("wallet command returned malformed output: {reason}")]
    MalformedOutput { reason: String, excerpt: String },
    #[error("wallet command result is incomplete: {message}")]
    IncompleteResult { message: String },
    #[error("no open wallet session for {0}")]
    SessionNotOpen(WalletId),
    #[error("wallet session {0} closed before the command completed")]
    SessionClosed(WalletId),
    #[error("wallet configuration error: {0}")]
    Configuration(String),
}

impl CommandFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ProcessLaunch { .. } => FailureKind::ProcessLaunch,
            Self::ProcessTimeout { .. } => FailureKind::ProcessTimeout,
            Self::CommandFailed { .. } => FailureKind::CommandFailed,
            Self::MalformedOutput { .. } => FailureKind::MalformedOutput,
            Self::IncompleteResult { .. } => FailureKind::IncompleteResult,
            Self::SessionNotOpen(_) => FailureKind::SessionNotOpen,
            Self::SessionClosed(_) => FailureKind::SessionClosed,
            Self::Configuration(_) => FailureKind::Configuration,
        }
    }

    /// Raw output preserved for diagnostics, when the failure carries any.
    pub fn excerpt(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { excerpt, .. } => Some(excerpt.as_str()),
            _ => None,
        }
    }
}

fn exit_code_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_owned(),
    }
}
