//! Configuration management for rollcall.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "rollcall";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "rollcall.db";

/// Default avatar directory name (inside the data directory).
const AVATAR_DIR_NAME: &str = "avatars";

/// Largest accepted UTC offset, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ROLLCALL_`)
/// 2. TOML config file at `~/.config/rollcall/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Session and bootstrap account configuration.
    pub auth: AuthConfig,
    /// Upload configuration.
    pub uploads: UploadConfig,
    /// Attendance statistics configuration.
    pub attendance: AttendanceConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Largest accepted request body in bytes.
    pub max_upload_bytes: usize,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/rollcall/rollcall.db`
    pub database_path: Option<PathBuf>,
}

/// Session and bootstrap account configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Name of the session cookie.
    pub session_cookie: String,
    /// Idle lifetime of a session in hours.
    pub session_ttl_hours: u32,
    /// Username of the administrator seeded on startup.
    pub admin_username: String,
    /// Initial password of the seeded administrator.
    pub admin_password: String,
    /// Display name of the seeded administrator.
    pub admin_name: String,
    /// Email of the seeded administrator.
    pub admin_email: String,
    /// PBKDF2 rounds used when hashing new passwords.
    pub password_iterations: u32,
}

/// Upload configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory avatars are written to.
    /// Defaults to `~/.local/share/rollcall/avatars`
    pub avatar_dir: Option<PathBuf>,
    /// Accepted avatar file extensions (lowercase, without dot).
    pub allowed_extensions: Vec<String>,
}

/// Attendance statistics configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendanceConfig {
    /// Number of days the organization-wide attendance rate spans.
    pub window_days: u32,
    /// Offset from UTC, in minutes, that defines the local calendar day.
    pub utc_offset_minutes: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: "rollcall_session".to_string(),
            session_ttl_hours: 24,
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
            admin_name: "Administrator".to_string(),
            admin_email: "admin@example.com".to_string(),
            password_iterations: crate::password::DEFAULT_ITERATIONS,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            avatar_dir: None,
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            utc_offset_minutes: 0,
        }
    }
}

/// Default avatar file extensions.
fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("ROLLCALL_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.auth.session_ttl_hours == 0 {
            return Err(Error::ConfigValidation {
                message: "session_ttl_hours must be greater than 0".to_string(),
            });
        }

        if self.auth.admin_username.trim().is_empty() || self.auth.admin_password.is_empty() {
            return Err(Error::ConfigValidation {
                message: "admin_username and admin_password must not be empty".to_string(),
            });
        }

        if self.auth.password_iterations == 0 {
            return Err(Error::ConfigValidation {
                message: "password_iterations must be greater than 0".to_string(),
            });
        }

        if self.auth.session_cookie.is_empty()
            || !self
                .auth
                .session_cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::ConfigValidation {
                message: format!("invalid session cookie name: {:?}", self.auth.session_cookie),
            });
        }

        if self.attendance.window_days == 0 {
            return Err(Error::ConfigValidation {
                message: "window_days must be greater than 0".to_string(),
            });
        }

        if self.attendance.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(Error::ConfigValidation {
                message: format!(
                    "utc_offset_minutes ({}) must be within +/-{MAX_UTC_OFFSET_MINUTES}",
                    self.attendance.utc_offset_minutes
                ),
            });
        }

        if self.uploads.allowed_extensions.is_empty() {
            return Err(Error::ConfigValidation {
                message: "allowed_extensions must not be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the avatar directory, resolving defaults if not set.
    #[must_use]
    pub fn avatar_dir(&self) -> PathBuf {
        self.uploads
            .avatar_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(AVATAR_DIR_NAME))
    }

    /// Get the `host:port` bind address.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Get the session idle lifetime as a Duration.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.auth.session_ttl_hours) * 60 * 60)
    }

    /// Get the offset that defines the local calendar day.
    #[must_use]
    pub fn local_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.attendance.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }
}
