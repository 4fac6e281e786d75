//! Configuration management for kiwi
//!
//! The config file is stored in the platform-appropriate location:
//! - Linux: ~/.config/kiwi/config.toml
//! - macOS: ~/Library/Application Support/kiwi/config.toml
//! - Windows: %APPDATA%\kiwi\config.toml
//!
//! `KIWI_CONFIG` overrides the path.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "KIWI_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid cookie secret (must be base64): {0}")]
    BadCookieSecret(#[from] base64::DecodeError),

    #[error("Config directory not found")]
    NoDirFound,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub devices: DevicesConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Cookie signing secret (base64 encoded)
    /// If not set, a random secret is generated on every start
    pub cookie_secret: Option<String>,

    /// JSON file holding the user records
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,

    /// Directory served as static assets
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    /// URL prefix for static assets
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,

    /// Lifetime of the transport session cookie in seconds
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    /// Flash mailboxes untouched for this long are evicted
    #[serde(default = "default_flash_idle")]
    pub flash_idle_secs: u64,

    /// Housekeeping interval in seconds
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,
}

/// External command configuration for the controlled devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// Program used to talk HDMI-CEC to the TV
    #[serde(default = "default_cec_client")]
    pub cec_client: String,

    /// Arguments passed to the CEC program (single command mode)
    #[serde(default = "default_cec_args")]
    pub cec_args: Vec<String>,

    /// Wake-on-LAN program
    #[serde(default = "default_wakeonlan")]
    pub wakeonlan: String,

    /// MAC address of the laptop woken by `/toshiba/wol`
    #[serde(default = "default_toshiba_mac")]
    pub toshiba_mac: String,

    /// Upper bound on a single external command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

// Default value functions
fn default_listen_addr() -> String {
    format!("0.0.0.0:{}", crate::DEFAULT_HTTP_PORT)
}
fn default_users_file() -> PathBuf {
    PathBuf::from("users.json")
}
fn default_public_dir() -> PathBuf {
    PathBuf::from("./media/public")
}
fn default_public_prefix() -> String {
    "/public".to_string()
}
fn default_session_max_age() -> u64 {
    crate::users::REMEMBERED_SESSION_MAX_SECS
}
fn default_flash_idle() -> u64 {
    24 * 3600
}
fn default_housekeeping_interval() -> u64 {
    300
}
fn default_cec_client() -> String {
    "cec-client".to_string()
}
fn default_cec_args() -> Vec<String> {
    vec!["-s".to_string(), "-d".to_string(), "1".to_string()]
}
fn default_wakeonlan() -> String {
    "wakeonlan".to_string()
}
fn default_toshiba_mac() -> String {
    "04:7D:7B:5B:FE:4D".to_string()
}
fn default_command_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cookie_secret: None,
            users_file: default_users_file(),
            public_dir: default_public_dir(),
            public_prefix: default_public_prefix(),
            session_max_age_secs: default_session_max_age(),
            flash_idle_secs: default_flash_idle(),
            housekeeping_interval_secs: default_housekeeping_interval(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            cec_client: default_cec_client(),
            cec_args: default_cec_args(),
            wakeonlan: default_wakeonlan(),
            toshiba_mac: default_toshiba_mac(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl ServerConfig {
    /// Decode the configured cookie secret, if any
    pub fn cookie_secret_bytes(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        self.cookie_secret
            .as_deref()
            .map(|s| base64::engine::general_purpose::STANDARD.decode(s.trim()))
            .transpose()
            .map_err(ConfigError::from)
    }
}

impl Config {
    /// Get config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("kiwi"))
            .ok_or(ConfigError::NoDirFound)
    }

    /// Get config file path, honouring `KIWI_CONFIG`
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from default location, falling back to defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load config from specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.public_prefix, "/public");
        assert_eq!(config.devices.cec_args, vec!["-s", "-d", "1"]);
        assert!(config.server.cookie_secret.is_none());
    }

    #[test]
    fn test_default_cookie_outlives_remembered_session() {
        let config = Config::default();
        assert!(config.server.session_max_age_secs >= crate::users::REMEMBERED_SESSION_MAX_SECS);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [server]
            listen_addr = "127.0.0.1:9000"
            cookie_secret = "c2VjcmV0LXNlY3JldC1zZWNyZXQ="
            "#,
        )
        .unwrap();

        assert_eq!(parsed.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(parsed.server.users_file, PathBuf::from("users.json"));
        assert_eq!(parsed.devices.wakeonlan, "wakeonlan");
        assert_eq!(
            parsed.server.cookie_secret_bytes().unwrap().unwrap(),
            b"secret-secret-secret".to_vec()
        );
    }

    #[test]
    fn test_bad_cookie_secret() {
        let mut config = Config::default();
        config.server.cookie_secret = Some("not base64!!".to_string());
        assert!(matches!(
            config.server.cookie_secret_bytes(),
            Err(ConfigError::BadCookieSecret(_))
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.devices.toshiba_mac = "AA:BB:CC:DD:EE:FF".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.devices.toshiba_mac, "AA:BB:CC:DD:EE:FF");
        assert_eq!(loaded.server.session_max_age_secs, 31 * 24 * 3600);
    }
}
