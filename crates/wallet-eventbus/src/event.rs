use std::sync::Arc;

use wallet_cache::WalletSnapshot;
use wallet_protocol::{CommandFailure, CommandKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// Published after the cache swapped in a new snapshot.
    SnapshotChanged { snapshot: Arc<WalletSnapshot> },
    CommandFailed {
        command: CommandKind,
        error: CommandFailure,
    },
    /// A scheduled refresh failed; `snapshot` carries the stale marker.
    RefreshFailed {
        command: CommandKind,
        error: CommandFailure,
        snapshot: Option<Arc<WalletSnapshot>>,
    },
    RefreshSkipped,
    SessionClosed,
}

impl WalletEvent {
    pub fn snapshot(&self) -> Option<&Arc<WalletSnapshot>> {
        match self {
            Self::SnapshotChanged { snapshot } => Some(snapshot),
            Self::RefreshFailed { snapshot, .. } => snapshot.as_ref(),
            Self::CommandFailed { .. } | Self::RefreshSkipped | Self::SessionClosed => None,
        }
    }
}
