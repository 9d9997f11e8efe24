use std::time::Duration;

use wallet_config::{ClientMode, SessionConfig, DEFAULT_PRIVATE_PORT, DEFAULT_PUBLIC_SERVER};
use wallet_protocol::{Command, CommandKind};

use crate::process::InvocationRequest;

const INCLUDE_WATCH_ONLY_FLAG: &str = "--include-watch-only";

/// Turns typed commands into `nockchain-wallet` argument vectors for one
/// session.
#[derive(Debug, Clone)]
pub struct WalletCommandLine {
    session: SessionConfig,
}

impl WalletCommandLine {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    pub fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match &self.session.client {
            ClientMode::Public { server } => {
                args.push("--client".to_owned());
                args.push("public".to_owned());
                if !server.is_empty() && server != DEFAULT_PUBLIC_SERVER {
                    args.push("--public-grpc-server-addr".to_owned());
                    args.push(server.clone());
                }
            }
            ClientMode::Private { port } => {
                args.push("--client".to_owned());
                args.push("private".to_owned());
                if *port != DEFAULT_PRIVATE_PORT {
                    args.push("--private-grpc-server-port".to_owned());
                    args.push(port.to_string());
                }
            }
        }
        args
    }

    pub fn args_for(&self, command: &Command) -> Vec<String> {
        let mut args = match command.kind {
            // Key import and export talk to the local keystore only.
            CommandKind::ImportWallet | CommandKind::ExportKeys => Vec::new(),
            _ => self.base_args(),
        };
        if command.kind.targets_wallet_file() && !command.wallet.as_str().is_empty() {
            args.push("--wallet".to_owned());
            args.push(command.wallet.as_str().to_owned());
        }
        args.push(self.session.subcommand(command.kind).to_owned());
        args.extend(command.args.iter().cloned());
        if command.kind == CommandKind::ListTransactions
            && self.session.include_watch_only
            && !args.iter().any(|arg| arg == INCLUDE_WATCH_ONLY_FLAG)
        {
            args.push(INCLUDE_WATCH_ONLY_FLAG.to_owned());
        }
        args
    }

    pub fn request_for(&self, command: &Command) -> InvocationRequest {
        InvocationRequest {
            program: self.session.binary.clone(),
            args: self.args_for(command),
            timeout: self.session.command_timeout,
        }
    }

    pub fn health_check_request(&self) -> InvocationRequest {
        InvocationRequest {
            program: self.session.binary.clone(),
            args: Self::health_check_args(),
            timeout: self.health_check_timeout(),
        }
    }

    pub fn health_check_args() -> Vec<String> {
        vec!["--help".to_owned()]
    }

    fn health_check_timeout(&self) -> Duration {
        self.session.health_check_timeout
    }
}
