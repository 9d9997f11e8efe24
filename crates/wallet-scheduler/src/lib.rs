//! Periodic read-only refresh of open wallets.

mod task;

pub use task::{
    RefreshScheduler, RefreshTarget, RefreshTaskId, MIN_REFRESH_INTERVAL, REFRESH_COMMANDS,
};
