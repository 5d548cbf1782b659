//! Events and event registrations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

use super::{non_empty, parsed_column, sql_limit, time_column, to_sql_time, Storage};
use crate::error::{Error, Result};
use crate::models::{Event, EventDraft, EventRegistration, RegistrationStatus};

const EVENT_COLUMNS: &str = "id, title, description, location, organizer_id, start_time, \
     end_time, max_participants, created_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, user_id, registered_at, status";

impl Storage {
    /// Insert an event and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn create_event(&self, draft: &EventDraft, now: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO events (title, description, location, organizer_id, start_time,
                                end_time, max_participants, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                draft.title.trim(),
                non_empty(&draft.description),
                draft.location.trim(),
                draft.organizer_id,
                to_sql_time(&draft.start_time),
                to_sql_time(&draft.end_time),
                draft.max_participants,
                to_sql_time(&now),
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(id, title = %draft.title, "Created event");
        Ok(id)
    }

    /// Get an event by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let event = self
            .conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                [id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    /// Overwrite an event's fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the event does not exist.
    pub fn update_event(&self, id: i64, draft: &EventDraft) -> Result<()> {
        let affected = self.conn.execute(
            r"
            UPDATE events SET title = ?2, description = ?3, location = ?4, organizer_id = ?5,
                              start_time = ?6, end_time = ?7, max_participants = ?8
            WHERE id = ?1
            ",
            params![
                id,
                draft.title.trim(),
                non_empty(&draft.description),
                draft.location.trim(),
                draft.organizer_id,
                to_sql_time(&draft.start_time),
                to_sql_time(&draft.end_time),
                draft.max_participants,
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("event"));
        }
        debug!(id, "Updated event");
        Ok(())
    }

    /// Delete an event with its check-ins and registrations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the event does not exist.
    pub fn delete_event(&mut self, id: i64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM check_ins WHERE event_id = ?1", [id])?;
        tx.execute("DELETE FROM event_registrations WHERE event_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM events WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(Error::not_found("event"));
        }
        tx.commit()?;
        info!(id, "Deleted event");
        Ok(())
    }

    /// All events, latest start first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_events(&self) -> Result<Vec<Event>> {
        self.query_events(
            &format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY start_time DESC, id DESC"),
            [],
        )
    }

    /// Events starting at or after `now`, soonest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upcoming_events(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Event>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE start_time >= ?1
                 ORDER BY start_time, id LIMIT ?2"
            ),
            params![to_sql_time(&now), sql_limit(limit)],
        )
    }

    /// Most recently created events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_events(&self, limit: usize) -> Result<Vec<Event>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC, id DESC LIMIT ?1"
            ),
            [sql_limit(limit)],
        )
    }

    /// Events a member organizes, most recently created first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn events_organized_by(&self, user_id: i64, limit: usize) -> Result<Vec<Event>> {
        self.query_events(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = ?1
                 ORDER BY created_at DESC, id DESC LIMIT ?2"
            ),
            params![user_id, sql_limit(limit)],
        )
    }

    /// Count all events.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_events(&self) -> Result<i64> {
        self.count_rows("events")
    }

    /// Count events starting at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_events_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE start_time >= ?1",
            [to_sql_time(&since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count events a member organizes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_events_organized_by(&self, user_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE organizer_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Give every organizer-less event to `admin_id`; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn assign_missing_organizers(&self, admin_id: i64) -> Result<usize> {
        let affected = self.conn.execute(
            "UPDATE events SET organizer_id = ?1 WHERE organizer_id IS NULL",
            [admin_id],
        )?;
        if affected > 0 {
            info!(affected, admin_id, "Assigned organizer to events");
        }
        Ok(affected)
    }

    /// Register a member, reactivating a cancelled registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn register_for_event(
        &self,
        event_id: i64,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let id = self.conn.query_row(
            r"
            INSERT INTO event_registrations (event_id, user_id, registered_at, status)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (event_id, user_id)
            DO UPDATE SET registered_at = excluded.registered_at, status = excluded.status
            RETURNING id
            ",
            params![
                event_id,
                user_id,
                to_sql_time(&now),
                RegistrationStatus::Registered.to_string()
            ],
            |row| row.get(0),
        )?;
        debug!(event_id, user_id, "Registered for event");
        Ok(id)
    }

    /// Set the status of a member's registration; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_registration_status(
        &self,
        event_id: i64,
        user_id: i64,
        status: RegistrationStatus,
    ) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE event_registrations SET status = ?3 WHERE event_id = ?1 AND user_id = ?2",
            params![event_id, user_id, status.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Cancel a member's registration; returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cancel_registration(&self, event_id: i64, user_id: i64) -> Result<bool> {
        self.set_registration_status(event_id, user_id, RegistrationStatus::Cancelled)
    }

    /// A member's registration for an event in any status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn user_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> Result<Option<EventRegistration>> {
        let registration = self
            .conn
            .query_row(
                &format!(
                    "SELECT {REGISTRATION_COLUMNS} FROM event_registrations
                     WHERE user_id = ?1 AND event_id = ?2"
                ),
                params![user_id, event_id],
                row_to_registration,
            )
            .optional()?;
        Ok(registration)
    }

    /// Count registrations for an event that are not cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_active_registrations(&self, event_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_registrations WHERE event_id = ?1 AND status != ?2",
            params![event_id, RegistrationStatus::Cancelled.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count a member's registrations that are not cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_user_registrations(&self, user_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM event_registrations WHERE user_id = ?1 AND status != ?2",
            params![user_id, RegistrationStatus::Cancelled.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn query_events(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let events = stmt
            .query_map(params, row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn row_to_event(row: &rusqlite::Row) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        location: row.get(3)?,
        organizer_id: row.get(4)?,
        start_time: time_column(row, 5)?,
        end_time: time_column(row, 6)?,
        max_participants: row.get(7)?,
        created_at: time_column(row, 8)?,
    })
}

fn row_to_registration(row: &rusqlite::Row) -> rusqlite::Result<EventRegistration> {
    Ok(EventRegistration {
        id: row.get(0)?,
        event_id: row.get(1)?,
        user_id: row.get(2)?,
        registered_at: time_column(row, 3)?,
        status: parsed_column(row, 4)?,
    })
}
