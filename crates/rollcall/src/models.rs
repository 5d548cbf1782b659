//! Core domain types for rollcall.
//!
//! Members ([`User`]) check in once per day or per [`Event`]; each attendance
//! is a [`CheckIn`] row. Event sign-ups are [`EventRegistration`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Position titles a member can hold, stored verbatim.
pub const POSITION_OPTIONS: &[&str] = &[
    "區董顧",
    "執行董顧",
    "董顧",
    "主席",
    "副主席",
    "教育組長",
    "資訊長",
];

/// Check whether a submitted position is acceptable.
///
/// Empty clears it. A member's `current` title is kept even when it is no
/// longer one of [`POSITION_OPTIONS`], so older rows stay editable.
#[must_use]
pub fn is_valid_position(position: &str, current: Option<&str>) -> bool {
    position.is_empty() || POSITION_OPTIONS.contains(&position) || current == Some(position)
}

/// A delegable permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create events.
    AddEvents,
    /// Edit any event.
    EditEvents,
    /// Delete any event.
    DeleteEvents,
    /// Create, edit and delete members.
    ManageUsers,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AddEvents => write!(f, "add_events"),
            Self::EditEvents => write!(f, "edit_events"),
            Self::DeleteEvents => write!(f, "delete_events"),
            Self::ManageUsers => write!(f, "manage_users"),
        }
    }
}

impl std::str::FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "add_events" => Ok(Self::AddEvents),
            "edit_events" => Ok(Self::EditEvents),
            "delete_events" => Ok(Self::DeleteEvents),
            "manage_users" => Ok(Self::ManageUsers),
            other => Err(Error::validation(format!("unknown permission: {other}"))),
        }
    }
}

/// The four delegated permission flags stored on a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionFlags {
    /// May create events.
    #[serde(rename = "can_add_events")]
    pub add_events: bool,
    /// May edit events.
    #[serde(rename = "can_edit_events")]
    pub edit_events: bool,
    /// May delete events.
    #[serde(rename = "can_delete_events")]
    pub delete_events: bool,
    /// May manage members.
    #[serde(rename = "can_manage_users")]
    pub manage_users: bool,
}

impl PermissionFlags {
    /// All flags set.
    #[must_use]
    pub fn all() -> Self {
        Self {
            add_events: true,
            edit_events: true,
            delete_events: true,
            manage_users: true,
        }
    }

    /// Whether the flag for `permission` is set.
    #[must_use]
    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::AddEvents => self.add_events,
            Permission::EditEvents => self.edit_events,
            Permission::DeleteEvents => self.delete_events,
            Permission::ManageUsers => self.manage_users,
        }
    }
}

/// A registered member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Row id.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Stored credential, see [`crate::password`].
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// LINE messenger id.
    pub line_id: Option<String>,
    /// Avatar file name inside the avatar directory.
    pub avatar: Option<String>,
    /// Position title, one of [`POSITION_OPTIONS`].
    pub position: Option<String>,
    /// Free-form self introduction.
    pub bio: Option<String>,
    /// Delegated permissions.
    #[serde(flatten)]
    pub permissions: PermissionFlags,
    /// Administrators hold every permission.
    pub is_admin: bool,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether this user holds `permission`, either directly or as an admin.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.is_admin || self.permissions.allows(permission)
    }

    /// Whether this user may edit or delete `event`.
    ///
    /// Admins and the event's organizer always may; otherwise the matching
    /// permission flag decides.
    #[must_use]
    pub fn can_modify_event(&self, event: &Event, permission: Permission) -> bool {
        self.is_admin || event.organizer_id == Some(self.id) || self.permissions.allows(permission)
    }
}

/// Lifecycle of a check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// Checked in, not yet out.
    CheckedIn,
    /// Checked out.
    CheckedOut,
}

impl std::fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CheckedIn => write!(f, "checked_in"),
            Self::CheckedOut => write!(f, "checked_out"),
        }
    }
}

impl std::str::FromStr for CheckInStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checked_in" => Ok(Self::CheckedIn),
            "checked_out" => Ok(Self::CheckedOut),
            other => Err(Error::internal(format!("unknown check-in status: {other}"))),
        }
    }
}

/// A single attendance record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIn {
    /// Row id.
    pub id: i64,
    /// Member who attended.
    pub user_id: i64,
    /// When the member checked in.
    pub check_in_time: DateTime<Utc>,
    /// When the member checked out, if they have.
    pub check_out_time: Option<DateTime<Utc>>,
    /// Where the check-in happened.
    pub location: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Current status.
    pub status: CheckInStatus,
    /// Event attended; `None` for the daily check-in.
    pub event_id: Option<i64>,
}

impl CheckIn {
    /// Whether this is a daily (non-event) check-in.
    #[must_use]
    pub fn is_daily(&self) -> bool {
        self.event_id.is_none()
    }
}

/// A check-in joined with the member it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInRecord {
    /// The check-in row.
    #[serde(flatten)]
    pub check_in: CheckIn,
    /// The member's login name.
    pub username: String,
    /// The member's display name.
    pub user_name: String,
}

/// Data for a new check-in row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckIn {
    /// Member checking in.
    pub user_id: i64,
    /// Event, or `None` for the daily check-in.
    pub event_id: Option<i64>,
    /// Location text.
    pub location: String,
    /// Notes text.
    pub notes: String,
    /// Check-in time.
    pub time: DateTime<Utc>,
}

/// An organized event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Row id.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Description.
    pub description: Option<String>,
    /// Venue.
    pub location: String,
    /// Organizing member, if still known.
    pub organizer_id: Option<i64>,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// End time.
    pub end_time: DateTime<Utc>,
    /// Participant limit; 0 means unlimited.
    pub max_participants: u32,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether the event has a participant limit.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.max_participants > 0
    }
}

/// Submitted fields for creating or updating an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Venue.
    pub location: String,
    /// Organizing member.
    pub organizer_id: i64,
    /// Start time.
    pub start_time: DateTime<Utc>,
    /// End time.
    pub end_time: DateTime<Utc>,
    /// Participant limit; 0 means unlimited.
    pub max_participants: u32,
}

impl EventDraft {
    /// Check required fields and time ordering.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::validation("title is required"));
        }
        if self.location.trim().is_empty() {
            return Err(Error::validation("location is required"));
        }
        if self.end_time < self.start_time {
            return Err(Error::validation("end time must not be before start time"));
        }
        Ok(())
    }
}

/// Lifecycle of an event registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Signed up.
    Registered,
    /// Signed up and checked in.
    Attended,
    /// Withdrew.
    Cancelled,
}

impl RegistrationStatus {
    /// Whether the registration still occupies a seat.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Attended => write!(f, "attended"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RegistrationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "registered" => Ok(Self::Registered),
            "attended" => Ok(Self::Attended),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::internal(format!(
                "unknown registration status: {other}"
            ))),
        }
    }
}

/// A member's sign-up for an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRegistration {
    /// Row id.
    pub id: i64,
    /// Event signed up for.
    pub event_id: i64,
    /// Member who signed up.
    pub user_id: i64,
    /// When they signed up.
    pub registered_at: DateTime<Utc>,
    /// Current status.
    pub status: RegistrationStatus,
}

/// Data for a new account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    /// Login name.
    pub username: String,
    /// Already-hashed password.
    pub password_hash: String,
    /// Display name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Phone.
    pub phone: String,
    /// LINE id.
    pub line_id: String,
    /// Position title.
    pub position: String,
    /// Delegated permissions.
    pub permissions: PermissionFlags,
    /// Administrator flag.
    pub is_admin: bool,
}

impl NewUser {
    /// Check the required fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a required field is missing.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() || self.name.trim().is_empty() {
            return Err(Error::validation("please fill in all required fields"));
        }
        if self.username.chars().count() > 80 {
            return Err(Error::validation("username is too long"));
        }
        if self.name.chars().count() > 100 {
            return Err(Error::validation("name is too long"));
        }
        if !is_valid_position(&self.position, None) {
            return Err(Error::validation(format!(
                "unknown position: {}",
                self.position
            )));
        }
        Ok(())
    }
}

/// Fields a member may change on their own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// Display name.
    pub name: String,
    /// Email.
    pub email: String,
    /// Phone.
    pub phone: String,
    /// LINE id.
    pub line_id: String,
    /// Position title.
    pub position: String,
    /// Self introduction.
    pub bio: String,
}

impl ProfileUpdate {
    /// Check the required fields.
    ///
    /// `current_position` is the title stored on the account being edited.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the name is missing or the position unknown.
    pub fn validate(&self, current_position: Option<&str>) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        if self.name.chars().count() > 100 {
            return Err(Error::validation("name is too long"));
        }
        if !is_valid_position(&self.position, current_position) {
            return Err(Error::validation(format!(
                "unknown position: {}",
                self.position
            )));
        }
        Ok(())
    }
}

/// Fields an administrator may change on any account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    /// Profile fields.
    pub profile: ProfileUpdate,
    /// Delegated permissions.
    pub permissions: PermissionFlags,
    /// Administrator flag.
    pub is_admin: bool,
}
