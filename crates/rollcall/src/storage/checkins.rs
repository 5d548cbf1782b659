//! Check-in rows, daily and per event.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{non_empty, opt_time_column, parsed_column, sql_limit, time_column, to_sql_time, Storage};
use crate::error::{Error, Result};
use crate::models::{CheckIn, CheckInRecord, CheckInStatus, NewCheckIn};

const CHECK_IN_COLUMNS: &str =
    "c.id, c.user_id, c.check_in_time, c.check_out_time, c.location, c.notes, c.status, c.event_id";

impl Storage {
    /// Insert a check-in with status `checked_in` and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails, including an
    /// unknown user or event.
    pub fn insert_check_in(&self, check_in: &NewCheckIn) -> Result<i64> {
        self.conn.execute(
            r"
            INSERT INTO check_ins (user_id, check_in_time, location, notes, status, event_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                check_in.user_id,
                to_sql_time(&check_in.time),
                non_empty(&check_in.location),
                non_empty(&check_in.notes),
                CheckInStatus::CheckedIn.to_string(),
                check_in.event_id,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, user_id = check_in.user_id, event_id = ?check_in.event_id, "Inserted check-in");
        Ok(id)
    }

    /// Get a check-in by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_check_in(&self, id: i64) -> Result<Option<CheckIn>> {
        let check_in = self
            .conn
            .query_row(
                &format!("SELECT {CHECK_IN_COLUMNS} FROM check_ins c WHERE c.id = ?1"),
                [id],
                row_to_check_in,
            )
            .optional()?;
        Ok(check_in)
    }

    /// The member's latest daily check-in in `[start, end)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn daily_check_in_between(
        &self,
        user_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<CheckIn>> {
        let check_in = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CHECK_IN_COLUMNS} FROM check_ins c
                     WHERE c.user_id = ?1 AND c.event_id IS NULL
                       AND c.check_in_time >= ?2 AND c.check_in_time < ?3
                     ORDER BY c.check_in_time DESC LIMIT 1"
                ),
                params![user_id, to_sql_time(&start), to_sql_time(&end)],
                row_to_check_in,
            )
            .optional()?;
        Ok(check_in)
    }

    /// The member's check-in for an event, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn event_check_in(&self, user_id: i64, event_id: i64) -> Result<Option<CheckIn>> {
        let check_in = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CHECK_IN_COLUMNS} FROM check_ins c
                     WHERE c.user_id = ?1 AND c.event_id = ?2
                     ORDER BY c.check_in_time LIMIT 1"
                ),
                params![user_id, event_id],
                row_to_check_in,
            )
            .optional()?;
        Ok(check_in)
    }

    /// Stamp a check-out time and flip the status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the check-in does not exist.
    pub fn mark_checked_out(&self, id: i64, when: DateTime<Utc>) -> Result<()> {
        let affected = self.conn.execute(
            "UPDATE check_ins SET check_out_time = ?2, status = ?3 WHERE id = ?1",
            params![
                id,
                to_sql_time(&when),
                CheckInStatus::CheckedOut.to_string()
            ],
        )?;
        if affected == 0 {
            return Err(Error::not_found("check-in"));
        }
        Ok(())
    }

    /// The newest check-ins across all members, with member names.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn recent_check_ins(&self, limit: usize) -> Result<Vec<CheckInRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHECK_IN_COLUMNS}, u.username, u.name
             FROM check_ins c JOIN users u ON u.id = c.user_id
             ORDER BY c.check_in_time DESC, c.id DESC LIMIT ?1"
        ))?;
        let records = stmt
            .query_map([sql_limit(limit)], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// A member's newest check-ins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn user_check_ins(&self, user_id: i64, limit: usize) -> Result<Vec<CheckIn>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHECK_IN_COLUMNS} FROM check_ins c
             WHERE c.user_id = ?1
             ORDER BY c.check_in_time DESC, c.id DESC LIMIT ?2"
        ))?;
        let check_ins = stmt
            .query_map(params![user_id, sql_limit(limit)], row_to_check_in)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(check_ins)
    }

    /// Everyone checked in to an event, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn event_participants(&self, event_id: i64) -> Result<Vec<CheckInRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHECK_IN_COLUMNS}, u.username, u.name
             FROM check_ins c JOIN users u ON u.id = c.user_id
             WHERE c.event_id = ?1
             ORDER BY c.check_in_time, c.id"
        ))?;
        let records = stmt
            .query_map([event_id], row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Count all check-ins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_check_ins(&self) -> Result<i64> {
        self.count_rows("check_ins")
    }

    /// Count a member's check-ins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_user_check_ins(&self, user_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM check_ins WHERE user_id = ?1",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Count a member's check-ins at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_user_check_ins_since(&self, user_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM check_ins WHERE user_id = ?1 AND check_in_time >= ?2",
            params![user_id, to_sql_time(&since)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_check_in(row: &rusqlite::Row) -> rusqlite::Result<CheckIn> {
    Ok(CheckIn {
        id: row.get(0)?,
        user_id: row.get(1)?,
        check_in_time: time_column(row, 2)?,
        check_out_time: opt_time_column(row, 3)?,
        location: row.get(4)?,
        notes: row.get(5)?,
        status: parsed_column(row, 6)?,
        event_id: row.get(7)?,
    })
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<CheckInRecord> {
    Ok(CheckInRecord {
        check_in: row_to_check_in(row)?,
        username: row.get(8)?,
        user_name: row.get(9)?,
    })
}
