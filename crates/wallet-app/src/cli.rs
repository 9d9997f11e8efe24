use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
}

fn usage(message: impl Into<String>) -> CliError {
    CliError::Usage(message.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    Balance,
    Transactions {
        include_watch_only: bool,
    },
    Status,
    Send {
        recipient: String,
        amount_nicks: u64,
        fee_nicks: Option<u64>,
        note_names: Vec<String>,
    },
    Import {
        keys_file: String,
    },
    Export {
        output: String,
    },
    Create,
    Block {
        height: u64,
    },
    Watch {
        ticks: Option<u64>,
    },
    Check,
}

impl AppCommand {
    /// Commands that only need the binary, not a wallet.
    pub fn needs_wallet(&self) -> bool {
        !matches!(self, Self::Check)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliInvocation {
    pub config_path: Option<PathBuf>,
    pub wallet: Option<String>,
    pub command: AppCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliAction {
    Help,
    Run(CliInvocation),
}

pub fn parse_cli_args<I>(args: I) -> Result<CliAction, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut wallet = None;
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(read_cli_value(&arg, args.next())?));
            }
            "--wallet" => {
                wallet = Some(read_cli_value(&arg, args.next())?);
            }
            "--help" | "-h" => return Ok(CliAction::Help),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let name = positional
        .next()
        .ok_or_else(|| usage("Missing command. Run with --help for valid commands."))?;
    let rest = positional.collect::<Vec<_>>();
    let command = parse_command(&name, rest)?;

    Ok(CliAction::Run(CliInvocation {
        config_path,
        wallet,
        command,
    }))
}

fn parse_command(name: &str, args: Vec<String>) -> Result<AppCommand, CliError> {
    let command = match name {
        "balance" => no_arguments(name, args, AppCommand::Balance)?,
        "transactions" => parse_transactions(args)?,
        "status" => no_arguments(name, args, AppCommand::Status)?,
        "create" => no_arguments(name, args, AppCommand::Create)?,
        "check" => no_arguments(name, args, AppCommand::Check)?,
        "send" => parse_send(args)?,
        "import" => AppCommand::Import {
            keys_file: single_argument(name, args, "<keys-file>")?,
        },
        "export" => AppCommand::Export {
            output: single_argument(name, args, "<output>")?,
        },
        "block" => {
            let height = single_argument(name, args, "<height>")?;
            AppCommand::Block {
                height: parse_number("<height>", &height)?,
            }
        }
        "watch" => parse_watch(args)?,
        unknown if unknown.starts_with("--") => {
            return Err(usage(format!(
                "Unknown flag '{unknown}'. Run with --help for valid flags."
            )));
        }
        unknown => {
            return Err(usage(format!(
                "Unknown command '{unknown}'. Run with --help for valid commands."
            )));
        }
    };
    Ok(command)
}

fn parse_send(args: Vec<String>) -> Result<AppCommand, CliError> {
    let mut fee_nicks = None;
    let mut note_names = Vec::new();
    let mut positional = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fee" => {
                let value = read_cli_value(&arg, args.next())?;
                fee_nicks = Some(parse_number("--fee", &value)?);
            }
            "--note" => note_names.push(read_cli_value(&arg, args.next())?),
            value if value.starts_with("--") => {
                return Err(usage(format!(
                    "Unknown flag '{value}' for send. Use send <address> <nicks> [--fee N] [--note NAME]..."
                )));
            }
            _ => positional.push(arg),
        }
    }

    let [recipient, amount] = <[String; 2]>::try_from(positional).map_err(|_| {
        usage("send expects exactly <address> <nicks>. Use send <address> <nicks> [--fee N] [--note NAME]...")
    })?;
    let amount_nicks = parse_number("<nicks>", &amount)?;
    if amount_nicks == 0 {
        return Err(usage("send amount must be greater than zero"));
    }

    Ok(AppCommand::Send {
        recipient,
        amount_nicks,
        fee_nicks,
        note_names,
    })
}

fn parse_transactions(args: Vec<String>) -> Result<AppCommand, CliError> {
    let mut include_watch_only = false;
    for arg in args {
        match arg.as_str() {
            "--watch-only" => include_watch_only = true,
            other => {
                return Err(usage(format!(
                    "Unexpected argument '{other}' for transactions. Use transactions [--watch-only]."
                )));
            }
        }
    }
    Ok(AppCommand::Transactions { include_watch_only })
}

fn parse_watch(args: Vec<String>) -> Result<AppCommand, CliError> {
    let mut ticks = None;
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--ticks" => {
                let value = read_cli_value(&arg, args.next())?;
                ticks = Some(parse_number("--ticks", &value)?);
            }
            other => {
                return Err(usage(format!(
                    "Unexpected argument '{other}' for watch. Use watch [--ticks N]."
                )));
            }
        }
    }
    Ok(AppCommand::Watch { ticks })
}

fn no_arguments(
    name: &str,
    args: Vec<String>,
    command: AppCommand,
) -> Result<AppCommand, CliError> {
    match args.first() {
        None => Ok(command),
        Some(extra) => Err(usage(format!("Unexpected argument '{extra}' for {name}."))),
    }
}

fn single_argument(name: &str, args: Vec<String>, placeholder: &str) -> Result<String, CliError> {
    let [value] = <[String; 1]>::try_from(args)
        .map_err(|_| usage(format!("{name} expects exactly one {placeholder} argument.")))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(usage(format!("{name} requires a non-empty {placeholder}.")));
    }
    Ok(value.to_owned())
}

fn read_cli_value(flag: &str, value: Option<String>) -> Result<String, CliError> {
    let value = value.ok_or_else(|| usage(format!("Missing value after {flag}.")))?;
    let value = value.trim();
    if value.is_empty() {
        return Err(usage(format!("Flag '{flag}' requires a non-empty value.")));
    }
    Ok(value.to_owned())
}

fn parse_number(label: &str, value: &str) -> Result<u64, CliError> {
    value
        .replace(',', "")
        .parse::<u64>()
        .map_err(|_| usage(format!("{label} must be a non-negative integer, got '{value}'.")))
}

pub fn help_text() -> &'static str {
    "Usage: nockwallet [--config PATH] [--wallet PATH] <command>

Commands:
  balance                                   Show the wallet balance
  transactions [--watch-only]               List wallet notes
  status                                    Show network height and version
  send <address> <nicks> [--fee N] [--note NAME]...
                                            Create and submit a transaction
  import <keys-file>                        Import keys into the wallet
  export <output>                           Export wallet keys to a file
  create                                    Generate a new key pair
  block <height>                            Show a block by height
  watch [--ticks N]                         Print snapshots as they refresh
  check                                     Verify the wallet binary runs

Flags:
  --config PATH                             Config file (default ~/.config/nockwallet/config.toml)
  --wallet PATH                             Wallet file; remembered in the config
  --help                                    Show this help message"
}
