//! Member accounts.

use chrono::{DateTime, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use super::{non_empty, time_column, to_sql_time, Storage};
use crate::error::{Error, Result};
use crate::models::{NewUser, PermissionFlags, ProfileUpdate, User, UserUpdate};

const USER_COLUMNS: &str = "id, username, password_hash, name, email, phone, line_id, avatar, \
     position, bio, can_add_events, can_edit_events, can_delete_events, can_manage_users, \
     is_admin, created_at";

impl Storage {
    /// Insert a new member and return its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateUsername`] if the username is taken.
    pub fn create_user(&self, user: &NewUser, now: DateTime<Utc>) -> Result<i64> {
        let result = self.conn.execute(
            r"
            INSERT INTO users (username, password_hash, name, email, phone, line_id, position,
                               can_add_events, can_edit_events, can_delete_events,
                               can_manage_users, is_admin, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                user.username.trim(),
                user.password_hash,
                user.name.trim(),
                non_empty(&user.email),
                non_empty(&user.phone),
                non_empty(&user.line_id),
                non_empty(&user.position),
                user.permissions.add_events,
                user.permissions.edit_events,
                user.permissions.delete_events,
                user.permissions.manage_users,
                user.is_admin,
                to_sql_time(&now),
            ],
        );

        match result {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                info!(id, username = %user.username, "Created user");
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(Error::DuplicateUsername)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a member by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                [id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get a member by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                [username.trim()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List all members in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Overwrite profile fields, flags and the admin bit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member does not exist.
    pub fn update_user(&self, id: i64, update: &UserUpdate) -> Result<()> {
        let profile = &update.profile;
        let affected = self.conn.execute(
            r"
            UPDATE users SET name = ?2, email = ?3, phone = ?4, line_id = ?5, position = ?6,
                             bio = ?7, can_add_events = ?8, can_edit_events = ?9,
                             can_delete_events = ?10, can_manage_users = ?11, is_admin = ?12
            WHERE id = ?1
            ",
            params![
                id,
                profile.name.trim(),
                non_empty(&profile.email),
                non_empty(&profile.phone),
                non_empty(&profile.line_id),
                non_empty(&profile.position),
                non_empty(&profile.bio),
                update.permissions.add_events,
                update.permissions.edit_events,
                update.permissions.delete_events,
                update.permissions.manage_users,
                update.is_admin,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("user"));
        }
        debug!(id, "Updated user");
        Ok(())
    }

    /// Overwrite the fields a member edits on their own profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member does not exist.
    pub fn update_profile(&self, id: i64, profile: &ProfileUpdate) -> Result<()> {
        let affected = self.conn.execute(
            r"
            UPDATE users SET name = ?2, email = ?3, phone = ?4, line_id = ?5, position = ?6, bio = ?7
            WHERE id = ?1
            ",
            params![
                id,
                profile.name.trim(),
                non_empty(&profile.email),
                non_empty(&profile.phone),
                non_empty(&profile.line_id),
                non_empty(&profile.position),
                non_empty(&profile.bio),
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("user"));
        }
        Ok(())
    }

    /// Replace a member's password hash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member does not exist.
    pub fn set_password(&self, id: i64, password_hash: &str) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE users SET password_hash = ?2 WHERE id = ?1",
            params![id, password_hash],
        )?;
        if affected == 0 {
            return Err(Error::not_found("user"));
        }
        info!(id, "Password changed");
        Ok(())
    }

    /// Set or clear a member's avatar file name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member does not exist.
    pub fn set_avatar(&self, id: i64, avatar: Option<&str>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE users SET avatar = ?2 WHERE id = ?1",
            params![id, avatar],
        )?;
        if affected == 0 {
            return Err(Error::not_found("user"));
        }
        Ok(())
    }

    /// Delete a member together with their check-ins and registrations.
    ///
    /// Events they organized are kept with no organizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the member does not exist.
    pub fn delete_user(&mut self, id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM check_ins WHERE user_id = ?1", [id])?;
        tx.execute("DELETE FROM event_registrations WHERE user_id = ?1", [id])?;
        tx.execute(
            "UPDATE events SET organizer_id = NULL WHERE organizer_id = ?1",
            [id],
        )?;
        let affected = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::not_found("user"));
        }
        tx.commit()?;
        info!(id, "Deleted user");
        Ok(())
    }

    /// Count all members.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_users(&self) -> Result<i64> {
        self.count_rows("users")
    }

    /// The administrator with the lowest id, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn first_admin(&self) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE is_admin = 1 ORDER BY id LIMIT 1"),
                [],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        line_id: row.get(6)?,
        avatar: row.get(7)?,
        position: row.get(8)?,
        bio: row.get(9)?,
        permissions: PermissionFlags {
            add_events: row.get(10)?,
            edit_events: row.get(11)?,
            delete_events: row.get(12)?,
            manage_users: row.get(13)?,
        },
        is_admin: row.get(14)?,
        created_at: time_column(row, 15)?,
    })
}
