use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use wallet_protocol::CommandKind;

pub const ENV_NOCKWALLET_CONFIG: &str = "NOCKWALLET_CONFIG";
pub const ENV_NOCKWALLET_BIN: &str = "NOCKWALLET_BIN";

pub const DEFAULT_WALLET_BINARY: &str = "nockchain-wallet";
pub const DEFAULT_PUBLIC_SERVER: &str = "https://nockchain-api.zorp.io";
pub const DEFAULT_PRIVATE_PORT: u16 = 50051;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 5;
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;
const DEFAULT_FEE_NICKS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}

impl ConfigError {
    fn configuration(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    #[serde(default = "default_wallet_binary")]
    pub wallet_binary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_path: Option<String>,
    #[serde(default)]
    pub client_type: ClientType,
    #[serde(default = "default_public_server")]
    pub public_server: String,
    #[serde(default = "default_private_port")]
    pub private_port: u16,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_health_check_timeout_secs")]
    pub health_check_timeout_secs: u64,
    #[serde(default = "default_fee_nicks")]
    pub default_fee: u64,
    #[serde(default)]
    pub include_watch_only: bool,
    #[serde(default)]
    pub commands: BTreeMap<String, String>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            wallet_binary: default_wallet_binary(),
            wallet_path: None,
            client_type: ClientType::default(),
            public_server: default_public_server(),
            private_port: default_private_port(),
            refresh_interval_secs: default_refresh_interval_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            health_check_timeout_secs: default_health_check_timeout_secs(),
            default_fee: default_fee_nicks(),
            include_watch_only: false,
            commands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    Public { server: String },
    Private { port: u16 },
}

/// Immutable per-session settings handed to the orchestrator. Changing any of
/// these requires reopening the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub binary: PathBuf,
    pub client: ClientMode,
    pub refresh_interval: Duration,
    pub command_timeout: Duration,
    pub health_check_timeout: Duration,
    pub default_fee: u64,
    /// Adds `--include-watch-only` to note listings.
    pub include_watch_only: bool,
    subcommands: HashMap<CommandKind, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_WALLET_BINARY),
            client: ClientMode::Public {
                server: DEFAULT_PUBLIC_SERVER.to_owned(),
            },
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            health_check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
            default_fee: DEFAULT_FEE_NICKS,
            include_watch_only: false,
            subcommands: HashMap::new(),
        }
    }
}

impl SessionConfig {
    pub fn subcommand(&self, kind: CommandKind) -> &str {
        self.subcommands
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_subcommand())
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_client(mut self, client: ClientMode) -> Self {
        self.client = client;
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_include_watch_only(mut self, include: bool) -> Self {
        self.include_watch_only = include;
        self
    }

    pub fn with_subcommand(mut self, kind: CommandKind, subcommand: impl Into<String>) -> Self {
        self.subcommands.insert(kind, subcommand.into());
        self
    }
}

impl WalletConfig {
    pub fn session(&self) -> Result<SessionConfig, ConfigError> {
        self.session_with_binary_override(std::env::var_os(ENV_NOCKWALLET_BIN))
    }

    pub fn session_with_binary_override(
        &self,
        binary_override: Option<OsString>,
    ) -> Result<SessionConfig, ConfigError> {
        let binary = match binary_override {
            Some(value) if value.is_empty() => {
                return Err(ConfigError::configuration(format!(
                    "{ENV_NOCKWALLET_BIN} is set but empty. Provide a valid wallet binary path or unset it."
                )))
            }
            Some(value) => PathBuf::from(value),
            None => PathBuf::from(self.wallet_binary.trim()),
        };

        let client = match self.client_type {
            ClientType::Public => ClientMode::Public {
                server: self.public_server.trim().to_owned(),
            },
            ClientType::Private => ClientMode::Private {
                port: self.private_port,
            },
        };

        let mut subcommands = HashMap::new();
        for (key, subcommand) in &self.commands {
            let kind = CommandKind::from_key(key.trim()).ok_or_else(|| {
                ConfigError::configuration(format!(
                    "Unknown command key '{key}' in [commands]; expected one of: {}",
                    CommandKind::ALL
                        .iter()
                        .map(|kind| kind.as_key())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;
            let subcommand = subcommand.trim();
            if subcommand.is_empty() {
                return Err(ConfigError::configuration(format!(
                    "Command override for '{key}' must not be empty"
                )));
            }
            subcommands.insert(kind, subcommand.to_owned());
        }

        Ok(SessionConfig {
            binary,
            client,
            refresh_interval: secs_or_default(
                self.refresh_interval_secs,
                DEFAULT_REFRESH_INTERVAL_SECS,
            ),
            command_timeout: secs_or_default(
                self.command_timeout_secs,
                DEFAULT_COMMAND_TIMEOUT_SECS,
            ),
            health_check_timeout: secs_or_default(
                self.health_check_timeout_secs,
                DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
            ),
            default_fee: self.default_fee,
            include_watch_only: self.include_watch_only,
            subcommands,
        })
    }
}

// Zero would mean "no deadline" or a busy refresh loop; configs that skipped
// normalization fall back to the defaults.
fn secs_or_default(value: u64, default: u64) -> Duration {
    Duration::from_secs(if value == 0 { default } else { value })
}

pub fn load_from_env() -> Result<WalletConfig, ConfigError> {
    let path = config_path_from_env()?;
    load_from_path(path)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<WalletConfig, ConfigError> {
    load_or_create_config(path.as_ref())
}

pub fn config_path_from_env() -> Result<PathBuf, ConfigError> {
    match std::env::var(ENV_NOCKWALLET_CONFIG) {
        Ok(raw) => {
            if raw.trim().is_empty() {
                default_config_path()
            } else {
                Ok(raw.into())
            }
        }
        Err(std::env::VarError::NotPresent) => default_config_path(),
        Err(_) => Err(ConfigError::configuration(
            "NOCKWALLET_CONFIG contained invalid UTF-8",
        )),
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = resolve_home_dir().ok_or_else(|| {
        ConfigError::configuration("Unable to resolve home directory from HOME or USERPROFILE")
    })?;

    Ok(home.join(".config").join("nockwallet").join("config.toml"))
}

pub fn persist_config(path: &Path, config: &WalletConfig) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(config).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to serialize NOCKWALLET_CONFIG for {}: {err}",
            path.display()
        ))
    })?;

    std::fs::write(path, rendered.as_bytes()).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to write NOCKWALLET_CONFIG to {}: {err}",
            path.display()
        ))
    })
}

fn load_or_create_config(path: &Path) -> Result<WalletConfig, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|err| {
                        ConfigError::configuration(format!(
                            "Failed to create parent directory {} for NOCKWALLET_CONFIG: {err}",
                            parent.display()
                        ))
                    })?;
                }
            }

            let default_config = WalletConfig::default();
            persist_config(path, &default_config)?;
            return Ok(default_config);
        }
        Err(err) => {
            return Err(ConfigError::configuration(format!(
                "Failed to read NOCKWALLET_CONFIG from {}: {err}",
                path.display()
            )));
        }
    };

    let mut config: WalletConfig = toml::from_str(&raw).map_err(|err| {
        ConfigError::configuration(format!(
            "Failed to parse NOCKWALLET_CONFIG from {}: {err}",
            path.display()
        ))
    })?;

    if normalize_config(&mut config) {
        persist_config(path, &config)?;
    }

    Ok(config)
}

pub fn normalize_config(config: &mut WalletConfig) -> bool {
    let mut changed = false;

    changed |= normalize_non_empty_string(&mut config.wallet_binary, default_wallet_binary());
    changed |= normalize_non_empty_string(&mut config.public_server, default_public_server());

    if config.private_port == 0 {
        config.private_port = default_private_port();
        changed = true;
    }

    if let Some(path) = config.wallet_path.as_ref() {
        if path.trim().is_empty() {
            config.wallet_path = None;
            changed = true;
        }
    }

    changed |= normalize_secs(
        &mut config.refresh_interval_secs,
        default_refresh_interval_secs(),
        1,
        300,
    );
    changed |= normalize_secs(
        &mut config.command_timeout_secs,
        default_command_timeout_secs(),
        1,
        600,
    );
    changed |= normalize_secs(
        &mut config.health_check_timeout_secs,
        default_health_check_timeout_secs(),
        1,
        60,
    );

    changed
}

fn normalize_non_empty_string(value: &mut String, default: String) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        *value = default;
        return true;
    }
    if trimmed.len() != value.len() {
        *value = trimmed.to_owned();
        return true;
    }
    false
}

fn normalize_secs(value: &mut u64, default: u64, min: u64, max: u64) -> bool {
    let normalized = if *value == 0 {
        default
    } else {
        (*value).clamp(min, max)
    };
    if normalized != *value {
        *value = normalized;
        return true;
    }
    false
}

fn resolve_home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("USERPROFILE")
                .ok()
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
}

fn default_wallet_binary() -> String {
    DEFAULT_WALLET_BINARY.to_owned()
}

fn default_public_server() -> String {
    DEFAULT_PUBLIC_SERVER.to_owned()
}

fn default_private_port() -> u16 {
    DEFAULT_PRIVATE_PORT
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

fn default_health_check_timeout_secs() -> u64 {
    DEFAULT_HEALTH_CHECK_TIMEOUT_SECS
}

fn default_fee_nicks() -> u64 {
    DEFAULT_FEE_NICKS
}
