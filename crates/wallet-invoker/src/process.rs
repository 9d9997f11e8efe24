use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use wallet_protocol::CommandFailure;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl InvocationRequest {
    pub fn rendered(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("failed to launch `{program}`: {message}")]
    Launch { program: String, message: String },
    #[error("`{program}` did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

impl From<InvokeError> for CommandFailure {
    fn from(error: InvokeError) -> Self {
        match error {
            InvokeError::Launch { .. } => CommandFailure::ProcessLaunch {
                message: error.to_string(),
            },
            InvokeError::Timeout { timeout, .. } => CommandFailure::ProcessTimeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn invoke(&self, request: &InvocationRequest) -> Result<ProcessOutput, InvokeError>;
}

/// Spawns the wallet binary on the tokio runtime. The child is created with
/// `kill_on_drop`, so a caller that abandons the future still takes the
/// process down with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessInvoker;

#[async_trait]
impl ProcessInvoker for TokioProcessInvoker {
    async fn invoke(&self, request: &InvocationRequest) -> Result<ProcessOutput, InvokeError> {
        let program = request.program.display().to_string();
        validate_program(&request.program, &program)?;

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|error| launch_error(&program, &error))?;
        let mut stdout = spawn_reader(child.stdout.take());
        let mut stderr = spawn_reader(child.stderr.take());

        // A grandchild can keep the pipes open after the child exits, so the
        // deadline covers draining them too.
        let run = async {
            let status = child.wait().await?;
            Ok::<_, io::Error>(ProcessOutput {
                stdout: collect_reader(&mut stdout).await,
                stderr: collect_reader(&mut stderr).await,
                exit_code: status.code(),
            })
        };
        let outcome = tokio::time::timeout(request.timeout, run).await;

        match outcome {
            Ok(Ok(output)) => {
                tracing::debug!(
                    program = program.as_str(),
                    exit_code = ?output.exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "wallet binary exited"
                );
                Ok(output)
            }
            Ok(Err(error)) => {
                let _ = child.kill().await;
                stdout.abort();
                stderr.abort();
                Err(InvokeError::Launch {
                    program,
                    message: format!("failed to wait for process: {error}"),
                })
            }
            Err(_) => {
                stdout.abort();
                stderr.abort();
                // kill() also waits, so the child is reaped before we return.
                if !matches!(child.try_wait(), Ok(Some(_))) {
                    if let Err(error) = child.kill().await {
                        tracing::warn!(
                            program = program.as_str(),
                            error = %error,
                            "failed to kill timed out wallet binary"
                        );
                    }
                }
                tracing::warn!(
                    program = program.as_str(),
                    timeout_ms = request.timeout.as_millis() as u64,
                    "wallet binary timed out"
                );
                Err(InvokeError::Timeout {
                    program,
                    timeout: request.timeout,
                })
            }
        }
    }
}

fn validate_program(binary: &Path, program: &str) -> Result<(), InvokeError> {
    if binary.as_os_str().is_empty() {
        return Err(InvokeError::Launch {
            program: program.to_owned(),
            message: "wallet binary path is empty".to_owned(),
        });
    }
    Ok(())
}

fn launch_error(program: &str, error: &io::Error) -> InvokeError {
    let message = match error.kind() {
        io::ErrorKind::NotFound => format!(
            "wallet binary was not found. Install nockchain-wallet or configure its path: {error}"
        ),
        io::ErrorKind::PermissionDenied => {
            format!("wallet binary is not executable: {error}")
        }
        _ => error.to_string(),
    };
    InvokeError::Launch {
        program: program.to_owned(),
        message,
    }
}

fn spawn_reader<R>(stream: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buffer).await;
        }
        buffer
    })
}

async fn collect_reader(handle: &mut JoinHandle<Vec<u8>>) -> String {
    match handle.await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => String::new(),
    }
}
