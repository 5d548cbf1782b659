//! Error types for rollcall.
//!
//! This module defines all error types used throughout the rollcall crate.
//! Domain rejections (already checked in, permission denied, ...) are ordinary
//! variants too; their `Display` text is what members see in flash messages
//! and JSON responses.

use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

/// The main error type for rollcall operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Access Errors ===
    /// The request has no logged-in user.
    #[error("please log in first")]
    NotAuthenticated,

    /// The logged-in user lacks the required permission.
    #[error("permission denied")]
    PermissionDenied,

    /// Username and password did not match.
    #[error("invalid username or password")]
    InvalidCredentials,

    // === Domain Errors ===
    /// A referenced record does not exist.
    #[error("{entity} not found")]
    NotFound {
        /// Kind of record ("user", "event", ...).
        entity: &'static str,
    },

    /// The username is already taken.
    #[error("username already exists")]
    DuplicateUsername,

    /// Submitted data failed validation.
    #[error("{message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A daily check-in already exists for today.
    #[error("already checked in today")]
    AlreadyCheckedIn,

    /// No daily check-in exists for today.
    #[error("not checked in today")]
    NotCheckedIn,

    /// Today's check-in already has a check-out time.
    #[error("already checked out today")]
    AlreadyCheckedOut,

    /// The member already checked in to this event.
    #[error("already checked in to this event")]
    AlreadyCheckedInEvent,

    /// The member already holds a registration for this event.
    #[error("already registered for this event")]
    AlreadyRegistered,

    /// The member has no active registration for this event.
    #[error("not registered for this event")]
    NotRegistered,

    /// The event reached its participant limit.
    #[error("event is full ({max} participants)")]
    EventFull {
        /// The participant limit.
        max: u32,
    },

    /// Admins cannot delete their own account.
    #[error("cannot delete your own account")]
    CannotDeleteSelf,

    /// An upload arrived without a file.
    #[error("no file selected")]
    NoFileSelected,

    /// An upload has an extension outside the allowed set.
    #[error("unsupported file type: {name}")]
    UnsupportedFileType {
        /// The rejected file name.
        name: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for rollcall operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not-found error for the given kind of record.
    #[must_use]
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Check if this error was caused by the request rather than the server.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this error is an authentication or authorization failure.
    #[must_use]
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated | Self::PermissionDenied | Self::InvalidCredentials
        )
    }

    /// HTTP status used when this error is returned from a JSON endpoint.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied | Self::CannotDeleteSelf => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::DuplicateUsername
            | Self::AlreadyCheckedIn
            | Self::NotCheckedIn
            | Self::AlreadyCheckedOut
            | Self::AlreadyCheckedInEvent
            | Self::AlreadyRegistered
            | Self::NotRegistered
            | Self::EventFull { .. } => StatusCode::CONFLICT,
            Self::Validation { .. } | Self::NoFileSelected | Self::UnsupportedFileType { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
