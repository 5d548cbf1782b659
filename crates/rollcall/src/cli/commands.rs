//! CLI command definitions and their handlers.
//!
//! Handlers write to any [`Write`] so they can be exercised without a
//! terminal.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};
use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{NewUser, PermissionFlags, User};
use crate::password::hash_password;
use crate::seed::ensure_admin_account;
use crate::storage::Storage;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    /// Apply the command-line overrides to `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
    }
}

/// Database commands.
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Create the schema and the admin account
    Init {
        /// Drop every table first
        #[arg(long)]
        reset: bool,
    },
}

impl DbCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation or output fails.
    pub fn run(&self, storage: &mut Storage, config: &Config, out: &mut dyn Write) -> Result<()> {
        match self {
            Self::Init { reset } => {
                if *reset {
                    storage.reset()?;
                    writeln!(out, "Database reset: {}", storage.path().display())?;
                } else {
                    writeln!(out, "Database ready: {}", storage.path().display())?;
                }
                match ensure_admin_account(storage, &config.auth, Utc::now())? {
                    Some(_) => writeln!(out, "Created admin account '{}'", config.auth.admin_username)?,
                    None => writeln!(out, "Admin account '{}' already exists", config.auth.admin_username)?,
                }
            }
        }
        Ok(())
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

impl StatusCommand {
    /// Print database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if a query or the output fails.
    pub fn run(&self, storage: &Storage, out: &mut dyn Write) -> Result<()> {
        let stats = storage.stats()?;
        if self.json {
            let status = serde_json::json!({
                "database_path": storage.path(),
                "stats": stats,
            });
            writeln!(out, "{}", serde_json::to_string_pretty(&status)?)?;
        } else {
            writeln!(out, "rollcall status")?;
            writeln!(out, "---------------")?;
            writeln!(out, "Database:       {}", storage.path().display())?;
            writeln!(out, "Schema version: {}", stats.schema_version)?;
            writeln!(out, "Size:           {} bytes", stats.db_size_bytes)?;
            writeln!(out, "Members:        {}", stats.users)?;
            writeln!(out, "Events:         {}", stats.events)?;
            writeln!(out, "Check-ins:      {}", stats.check_ins)?;
            writeln!(out, "Registrations:  {}", stats.registrations)?;
        }
        Ok(())
    }
}

/// Member management commands.
#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// Create a member account
    Add {
        /// Login name
        username: String,

        /// Display name
        name: String,

        /// Initial password
        #[arg(short, long)]
        password: String,

        /// Grant administrator rights and every permission
        #[arg(long)]
        admin: bool,
    },

    /// List member accounts
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Set a member's password
    Passwd {
        /// Login name
        username: String,

        /// New password
        password: String,
    },
}

impl UserCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns an error if validation, the database operation or output fails.
    pub fn run(&self, storage: &Storage, config: &Config, out: &mut dyn Write) -> Result<()> {
        let iterations = config.auth.password_iterations;
        match self {
            Self::Add {
                username,
                name,
                password,
                admin,
            } => {
                if password.is_empty() {
                    return Err(Error::validation("password must not be empty"));
                }
                let new_user = NewUser {
                    username: username.trim().to_string(),
                    password_hash: hash_password(password, iterations),
                    name: name.trim().to_string(),
                    permissions: if *admin {
                        PermissionFlags::all()
                    } else {
                        PermissionFlags::default()
                    },
                    is_admin: *admin,
                    ..NewUser::default()
                };
                new_user.validate()?;
                let id = storage.create_user(&new_user, Utc::now())?;
                info!(username = %new_user.username, id, "Member created from CLI");
                writeln!(out, "Created member '{}' (id {id})", new_user.username)?;
            }
            Self::List { format } => {
                let users = storage.list_users()?;
                print_users(&users, *format, out)?;
            }
            Self::Passwd { username, password } => {
                if password.is_empty() {
                    return Err(Error::validation("password must not be empty"));
                }
                let user = storage
                    .get_user_by_username(username)?
                    .ok_or_else(|| Error::not_found("user"))?;
                storage.set_password(user.id, &hash_password(password, iterations))?;
                writeln!(out, "Password updated for '{}'", user.username)?;
            }
        }
        Ok(())
    }
}

fn print_users(users: &[User], format: OutputFormat, out: &mut dyn Write) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(users)?)?;
        }
        OutputFormat::Plain => {
            for user in users {
                writeln!(out, "{}\t{}", user.username, user.name)?;
            }
        }
        OutputFormat::Table => {
            let width = users
                .iter()
                .map(|u| u.username.chars().count())
                .max()
                .unwrap_or(0)
                .max("USERNAME".len());
            writeln!(out, "{:>4}  {:<width$}  {:<5}  NAME", "ID", "USERNAME", "ADMIN")?;
            for user in users {
                let admin = if user.is_admin { "yes" } else { "" };
                writeln!(
                    out,
                    "{:>4}  {:<width$}  {:<5}  {}",
                    user.id, user.username, admin, user.name
                )?;
            }
        }
    }
    Ok(())
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

impl ConfigCommand {
    /// Run the command.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or output fails.
    pub fn run(&self, config: &Config, out: &mut dyn Write) -> Result<()> {
        match self {
            Self::Show { json } => {
                if *json {
                    writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
                } else {
                    show_config(config, out)?;
                }
            }
            Self::Path => {
                writeln!(out, "{}", Config::default_config_path().display())?;
            }
            Self::Validate { file } => {
                let path = file.clone().unwrap_or_else(Config::default_config_path);
                writeln!(out, "Validating configuration: {}", path.display())?;
                match Config::load_from(Some(path)) {
                    Ok(_) => writeln!(out, "Configuration is valid.")?,
                    Err(e) => writeln!(out, "Configuration error: {e}")?,
                }
            }
        }
        Ok(())
    }
}

fn show_config(config: &Config, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Current Configuration")?;
    writeln!(out, "=====================")?;
    writeln!(out)?;
    writeln!(out, "[Server]")?;
    writeln!(out, "  Bind address:       {}", config.bind_address())?;
    writeln!(out, "  Max upload bytes:   {}", config.server.max_upload_bytes)?;
    writeln!(out)?;
    writeln!(out, "[Storage]")?;
    writeln!(out, "  Database path:      {}", config.database_path().display())?;
    writeln!(out)?;
    writeln!(out, "[Auth]")?;
    writeln!(out, "  Session cookie:     {}", config.auth.session_cookie)?;
    writeln!(out, "  Session TTL (h):    {}", config.auth.session_ttl_hours)?;
    writeln!(out, "  Admin username:     {}", config.auth.admin_username)?;
    writeln!(out, "  Password rounds:    {}", config.auth.password_iterations)?;
    writeln!(out)?;
    writeln!(out, "[Uploads]")?;
    writeln!(out, "  Avatar directory:   {}", config.avatar_dir().display())?;
    writeln!(
        out,
        "  Extensions:         {}",
        config.uploads.allowed_extensions.join(", ")
    )?;
    writeln!(out)?;
    writeln!(out, "[Attendance]")?;
    writeln!(out, "  Window (days):      {}", config.attendance.window_days)?;
    writeln!(
        out,
        "  UTC offset (min):   {}",
        config.attendance.utc_offset_minutes
    )?;
    Ok(())
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Tab-separated lines
    Plain,
    /// Aligned table
    #[default]
    Table,
    /// JSON array
    Json,
}
