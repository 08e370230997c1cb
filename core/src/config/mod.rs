pub mod expand;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::files::naming::NamingRule;
use crate::retry::RetryOptions;

/// Top-level configuration consumed by the transfer core.
///
/// Loaded from a camelCase JSON document:
///
/// ```json
/// {
///   "backend": { "type": "local", "root": "~/uploads" },
///   "storage": { "namingRule": "contentHash", "retry": { "maxRetries": 5 } }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageSettings,
}

impl TransferConfig {
    /// Read and parse a JSON configuration file, expanding placeholders.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse a JSON configuration document, expanding placeholders.
    pub fn from_json(raw: &str) -> Result<Self, CoreError> {
        let config: TransferConfig =
            serde_json::from_str(raw).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config.expand())
    }

    /// Return a copy with all `${env:...}` placeholders and `~` expanded.
    pub fn expand(mut self) -> Self {
        self.backend = match self.backend {
            BackendConfig::Local(local) => BackendConfig::Local(local.expand()),
            BackendConfig::Sftp(sftp) => BackendConfig::Sftp(sftp.expand()),
        };
        self
    }

    fn validate(&self) -> Result<(), CoreError> {
        match &self.backend {
            BackendConfig::Local(local) if local.root.trim().is_empty() => {
                return Err(CoreError::Config("local root must not be empty".into()));
            }
            BackendConfig::Sftp(sftp) if sftp.host.trim().is_empty() => {
                return Err(CoreError::Config("sftp host must not be empty".into()));
            }
            _ => {}
        }
        if self.storage.buffer_size == 0 {
            return Err(CoreError::Config("bufferSize must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Which storage backend to talk to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackendConfig {
    Local(LocalConfig),
    Sftp(SftpConfig),
}

/// Local disk backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    /// Directory every relative path is resolved against.
    pub root: String,
}

impl LocalConfig {
    /// Return a copy with all `${env:...}` placeholders and `~` expanded.
    pub fn expand(mut self) -> Self {
        self.root = expand::expand_tilde(&expand::expand_env_placeholders(&self.root));
        self
    }
}

/// SFTP backend configuration.
///
/// - `auth_method`: `"password"`, `"key"` or `"agent"`.
/// - `key_path`: private key (certificate) file for `"key"` auth; the
///   password doubles as its passphrase.
/// - `root`: remote directory every relative path is resolved against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default = "default_auth_method")]
    pub auth_method: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
    #[serde(default = "default_remote_root")]
    pub root: String,
    /// Per-call libssh2 timeout in milliseconds; `0` disables it.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            auth_method: default_auth_method(),
            password: None,
            key_path: None,
            root: default_remote_root(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl SftpConfig {
    /// Return a copy with all `${env:...}` placeholders and `~` expanded.
    pub fn expand(mut self) -> Self {
        self.host = expand::expand_env_placeholders(&self.host);
        self.username = expand::expand_env_placeholders(&self.username);
        self.key_path = self.key_path.map(|s| {
            // Pasted paths often arrive quoted.
            let stripped = s.trim().trim_matches('"').trim_matches('\'');
            expand::expand_tilde(&expand::expand_env_placeholders(stripped))
        });
        self.password = self.password.map(|s| expand::expand_env_placeholders(&s));
        self.root = expand::expand_env_placeholders(&self.root);
        self
    }
}

/// Per-backend transfer policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    /// Naming rule applied when an upload does not name one explicitly.
    #[serde(default)]
    pub naming_rule: NamingRule,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_true")]
    pub use_sequenced_name: bool,
    /// Chunk size for stream reads and writes.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_true")]
    pub validate_integrity: bool,
    #[serde(default = "default_true")]
    pub cleanup_on_failure: bool,
    /// Store a `<file>.md5` sidecar next to each upload.
    #[serde(default)]
    pub write_metadata_hash: bool,
    #[serde(default)]
    pub retry: RetryOptions,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            naming_rule: NamingRule::default(),
            overwrite: false,
            use_sequenced_name: default_true(),
            buffer_size: default_buffer_size(),
            validate_integrity: default_true(),
            cleanup_on_failure: default_true(),
            write_metadata_hash: false,
            retry: RetryOptions::default(),
        }
    }
}

// --- Default value functions ---

fn default_ssh_port() -> u16 {
    22
}

fn default_auth_method() -> String {
    "password".to_string()
}

fn default_remote_root() -> String {
    ".".to_string()
}

fn default_timeout_ms() -> u32 {
    30_000
}

fn default_buffer_size() -> usize {
    81_920
}

fn default_true() -> bool {
    true
}
