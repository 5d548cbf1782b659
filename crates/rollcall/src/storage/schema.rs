//! `SQLite` schema definitions for rollcall.
//!
//! Timestamps are stored as UTC RFC 3339 text with second precision so that
//! string comparison orders them chronologically.

/// SQL statement to create the users table.
pub const CREATE_USERS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    email TEXT,
    phone TEXT,
    line_id TEXT,
    avatar TEXT,
    position TEXT,
    bio TEXT,
    can_add_events INTEGER NOT NULL DEFAULT 0,
    can_edit_events INTEGER NOT NULL DEFAULT 0,
    can_delete_events INTEGER NOT NULL DEFAULT 0,
    can_manage_users INTEGER NOT NULL DEFAULT 0,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,
    location TEXT NOT NULL,
    organizer_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    max_participants INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the check-ins table.
pub const CREATE_CHECK_INS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS check_ins (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    check_in_time TEXT NOT NULL,
    check_out_time TEXT,
    location TEXT,
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'checked_in',
    event_id INTEGER REFERENCES events(id)
)
";

/// SQL statement to create the event registrations table.
pub const CREATE_REGISTRATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS event_registrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id),
    user_id INTEGER NOT NULL REFERENCES users(id),
    registered_at TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'registered',
    UNIQUE (event_id, user_id)
)
";

/// Index for per-user check-in lookups by time.
pub const CREATE_CHECK_IN_USER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_check_ins_user_time ON check_ins(user_id, check_in_time DESC)
";

/// Index for event participant lookups.
pub const CREATE_CHECK_IN_EVENT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_check_ins_event ON check_ins(event_id)
";

/// Index for ordering events by start time.
pub const CREATE_EVENT_START_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_time DESC)
";

/// Index for events by organizer.
pub const CREATE_EVENT_ORGANIZER_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_events_organizer ON events(organizer_id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_USERS_TABLE,
    CREATE_EVENTS_TABLE,
    CREATE_CHECK_INS_TABLE,
    CREATE_REGISTRATIONS_TABLE,
    CREATE_CHECK_IN_USER_INDEX,
    CREATE_CHECK_IN_EVENT_INDEX,
    CREATE_EVENT_START_INDEX,
    CREATE_EVENT_ORGANIZER_INDEX,
    CREATE_METADATA_TABLE,
];

/// Tables dropped by a reset, children first.
pub const TABLES: &[&str] = &[
    "event_registrations",
    "check_ins",
    "events",
    "users",
    "metadata",
];
