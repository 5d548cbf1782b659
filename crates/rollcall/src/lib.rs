//! `rollcall` - Member check-in and event management service
//!
//! This library provides the domain rules, `SQLite` storage and axum HTTP
//! handlers behind the `rollcall` binary: daily and per-event check-ins,
//! event registrations, member profiles with avatars, and a flat
//! four-flag permission model for administration.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod attendance;
pub mod avatar;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod password;
pub mod seed;
pub mod stats;
pub mod storage;
pub mod web;

pub use avatar::AvatarStore;
pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use models::{CheckIn, Event, EventRegistration, Permission, PermissionFlags, User};
pub use storage::{Storage, StorageStats};
pub use web::{router, serve, AppState};
