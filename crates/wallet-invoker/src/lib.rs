//! Runs the external wallet binary: one process per invocation, bounded by a
//! timeout, always reaped.

mod command_line;
mod process;

pub use command_line::WalletCommandLine;
pub use process::{
    InvocationRequest, InvokeError, ProcessInvoker, ProcessOutput, TokioProcessInvoker,
};
