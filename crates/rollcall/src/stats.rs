//! Attendance arithmetic and the aggregates shown on the dashboard, profile
//! and admin pages.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Utc};
use serde::Serialize;

use crate::attendance::{local_day_bounds, local_to_utc};
use crate::error::Result;
use crate::models::{CheckIn, CheckInRecord, Event, User};
use crate::storage::Storage;

/// Upcoming events shown on the dashboard.
const DASHBOARD_UPCOMING: usize = 3;
/// Check-ins listed on the own-profile page.
const PROFILE_CHECK_INS: usize = 10;
/// Organized events listed on a member's public profile.
const PROFILE_EVENTS: usize = 5;
/// Events listed on the admin overview.
const ADMIN_RECENT_EVENTS: usize = 5;
/// Check-ins listed on the admin overview.
const ADMIN_RECENT_CHECK_INS: usize = 10;

/// Midnight on the first day of the local month containing `now`.
#[must_use]
pub fn month_start(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let today = now.with_timezone(&offset).date_naive();
    let first = today - Duration::days(i64::from(today.day0()));
    local_to_utc(first.and_time(NaiveTime::MIN), offset)
}

/// Whole days since the month started, counting today.
#[must_use]
pub fn days_elapsed(now: DateTime<Utc>, offset: FixedOffset) -> i64 {
    (now - month_start(now, offset)).num_days() + 1
}

/// Share of the month's days with a check-in, in percent with one decimal.
#[must_use]
pub fn dashboard_rate(checkins_this_month: i64, days_elapsed: i64) -> f64 {
    if days_elapsed <= 0 {
        return 0.0;
    }
    percent(checkins_this_month, days_elapsed).min(100.0)
}

/// A member's check-ins relative to all events, in percent with one decimal,
/// plus the absent count.
#[must_use]
pub fn profile_rate(user_checkins: i64, total_events: i64) -> (f64, i64) {
    if total_events <= 0 {
        return (0.0, 0);
    }
    let rate = percent(user_checkins, total_events).min(100.0);
    let absent = (total_events - user_checkins).max(0);
    (rate, absent)
}

/// Organization-wide rate: check-ins over members times window days, floored.
#[must_use]
pub fn org_rate(total_checkins: i64, total_users: i64, window_days: u32) -> u32 {
    let capacity = total_users.saturating_mul(i64::from(window_days));
    if capacity <= 0 {
        return 0;
    }
    let rate = total_checkins.max(0).saturating_mul(100) / capacity;
    u32::try_from(rate.min(100)).unwrap_or(100)
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: i64, whole: i64) -> f64 {
    round1(part as f64 / whole as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Figures on a member's dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Today's daily check-in, if any.
    pub today: Option<CheckIn>,
    /// Check-ins since the month started.
    pub checkins_this_month: i64,
    /// Events starting since the month started.
    pub events_this_month: i64,
    /// See [`dashboard_rate`].
    pub attendance_rate: f64,
    /// Next few events.
    pub upcoming: Vec<Event>,
}

impl Dashboard {
    /// Build the dashboard for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn build(
        storage: &Storage,
        user: &User,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<Self> {
        let (day_start, day_end) = local_day_bounds(now, offset);
        let since = month_start(now, offset);
        let checkins_this_month = storage.count_user_check_ins_since(user.id, since)?;

        Ok(Self {
            today: storage.daily_check_in_between(user.id, day_start, day_end)?,
            checkins_this_month,
            events_this_month: storage.count_events_since(since)?,
            attendance_rate: dashboard_rate(checkins_this_month, days_elapsed(now, offset)),
            upcoming: storage.upcoming_events(now, DASHBOARD_UPCOMING)?,
        })
    }
}

/// Figures on a member's own profile page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    /// All check-ins.
    pub checkin_count: i64,
    /// Events organized.
    pub organized_count: i64,
    /// Active registrations.
    pub registration_count: i64,
    /// Latest check-ins.
    pub recent: Vec<CheckIn>,
}

impl ProfileSummary {
    /// Build the summary for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn build(storage: &Storage, user: &User) -> Result<Self> {
        Ok(Self {
            checkin_count: storage.count_user_check_ins(user.id)?,
            organized_count: storage.count_events_organized_by(user.id)?,
            registration_count: storage.count_user_registrations(user.id)?,
            recent: storage.user_check_ins(user.id, PROFILE_CHECK_INS)?,
        })
    }
}

/// Figures on another member's public profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberSummary {
    /// All check-ins.
    pub checkin_count: i64,
    /// Latest organized events.
    pub organized: Vec<Event>,
    /// See [`profile_rate`].
    pub attendance_rate: f64,
    /// Events without a check-in.
    pub absent_count: i64,
}

impl MemberSummary {
    /// Build the summary for `user`.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn build(storage: &Storage, user: &User) -> Result<Self> {
        let checkin_count = storage.count_user_check_ins(user.id)?;
        let (attendance_rate, absent_count) =
            profile_rate(checkin_count, storage.count_events()?);
        Ok(Self {
            checkin_count,
            organized: storage.events_organized_by(user.id, PROFILE_EVENTS)?,
            attendance_rate,
            absent_count,
        })
    }
}

/// Figures on the admin overview.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminOverview {
    /// Members.
    pub total_users: i64,
    /// Events.
    pub total_events: i64,
    /// Check-ins.
    pub total_checkins: i64,
    /// See [`org_rate`].
    pub attendance_rate: u32,
    /// Latest created events.
    pub recent_events: Vec<Event>,
    /// Latest check-ins.
    pub recent_checkins: Vec<CheckInRecord>,
}

impl AdminOverview {
    /// Build the overview.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn build(storage: &Storage, window_days: u32) -> Result<Self> {
        let total_users = storage.count_users()?;
        let total_checkins = storage.count_check_ins()?;
        Ok(Self {
            total_users,
            total_events: storage.count_events()?,
            total_checkins,
            attendance_rate: org_rate(total_checkins, total_users, window_days),
            recent_events: storage.recent_events(ADMIN_RECENT_EVENTS)?,
            recent_checkins: storage.recent_check_ins(ADMIN_RECENT_CHECK_INS)?,
        })
    }
}
