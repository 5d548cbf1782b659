//! Check-in rules.
//!
//! Each rule validates against the current rows and then touches one or two
//! rows. Callers pass `now` and the offset that defines the local calendar
//! day, so the rules never read the system clock.

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{CheckIn, NewCheckIn, Permission, RegistrationStatus, User};
use crate::storage::Storage;

/// Accepted layouts for event start and end times.
const LOCAL_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// The UTC instants bounding the local calendar day containing `now`.
#[must_use]
pub fn local_day_bounds(now: DateTime<Utc>, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let start = local_to_utc(midnight, offset);
    (start, start + Duration::days(1))
}

/// Parse a form date-time (`YYYY-MM-DDTHH:MM[:SS]`) given in local time.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the input matches neither layout.
pub fn parse_local_datetime(input: &str, offset: FixedOffset) -> Result<DateTime<Utc>> {
    let input = input.trim();
    LOCAL_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| local_to_utc(naive, offset))
        .ok_or_else(|| Error::validation(format!("invalid date/time: {input:?}")))
}

/// Format a UTC instant as a form date-time in local time.
#[must_use]
pub fn format_local_datetime(time: DateTime<Utc>, offset: FixedOffset) -> String {
    time.with_timezone(&offset).format("%Y-%m-%dT%H:%M").to_string()
}

pub(crate) fn local_to_utc(naive: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    (naive - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

/// Record today's daily check-in.
///
/// # Errors
///
/// Returns [`Error::AlreadyCheckedIn`] if a daily check-in exists for the
/// local day, whatever its status.
pub fn check_in(
    storage: &Storage,
    user: &User,
    location: &str,
    notes: &str,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<CheckIn> {
    let (start, end) = local_day_bounds(now, offset);
    if storage.daily_check_in_between(user.id, start, end)?.is_some() {
        return Err(Error::AlreadyCheckedIn);
    }

    let id = storage.insert_check_in(&NewCheckIn {
        user_id: user.id,
        event_id: None,
        location: location.to_string(),
        notes: notes.to_string(),
        time: now,
    })?;
    info!(user = %user.username, "Checked in");
    storage
        .get_check_in(id)?
        .ok_or_else(|| Error::internal("check-in vanished after insert"))
}

/// Close today's daily check-in.
///
/// # Errors
///
/// Returns [`Error::NotCheckedIn`] without a check-in today and
/// [`Error::AlreadyCheckedOut`] if it is already closed.
pub fn check_out(
    storage: &Storage,
    user: &User,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Result<CheckIn> {
    let (start, end) = local_day_bounds(now, offset);
    let today = storage
        .daily_check_in_between(user.id, start, end)?
        .ok_or(Error::NotCheckedIn)?;
    if today.check_out_time.is_some() {
        return Err(Error::AlreadyCheckedOut);
    }

    storage.mark_checked_out(today.id, now)?;
    info!(user = %user.username, "Checked out");
    storage
        .get_check_in(today.id)?
        .ok_or_else(|| Error::internal("check-in vanished after update"))
}

/// A request to check a member in to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventCheckIn {
    /// Event to check in to.
    pub event_id: i64,
    /// Member to check in; the actor when `None`.
    pub target_user: Option<i64>,
    /// Location; the event's venue when blank.
    pub location: String,
    /// Notes.
    pub notes: String,
}

/// Check a member in to an event.
///
/// Checking in someone other than `actor` needs admin rights, organizer
/// status or [`Permission::EditEvents`]. An active registration of the
/// member is marked attended.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown event or member,
/// [`Error::PermissionDenied`] when the actor may not check in others, and
/// [`Error::AlreadyCheckedInEvent`] for a repeat.
pub fn event_check_in(
    storage: &Storage,
    actor: &User,
    request: &EventCheckIn,
    now: DateTime<Utc>,
) -> Result<CheckIn> {
    let event = storage
        .get_event(request.event_id)?
        .ok_or_else(|| Error::not_found("event"))?;

    let target_id = request.target_user.unwrap_or(actor.id);
    if target_id != actor.id && !actor.can_modify_event(&event, Permission::EditEvents) {
        return Err(Error::PermissionDenied);
    }
    let target = storage
        .get_user(target_id)?
        .ok_or_else(|| Error::not_found("user"))?;

    if storage.event_check_in(target.id, event.id)?.is_some() {
        return Err(Error::AlreadyCheckedInEvent);
    }

    let location = if request.location.trim().is_empty() {
        event.location.clone()
    } else {
        request.location.clone()
    };
    let id = storage.insert_check_in(&NewCheckIn {
        user_id: target.id,
        event_id: Some(event.id),
        location,
        notes: request.notes.clone(),
        time: now,
    })?;

    if let Some(registration) = storage.user_registration(target.id, event.id)? {
        if registration.status == RegistrationStatus::Registered {
            storage.set_registration_status(event.id, target.id, RegistrationStatus::Attended)?;
            debug!(user = %target.username, event = event.id, "Registration attended");
        }
    }

    info!(
        user = %target.username,
        actor = %actor.username,
        event = event.id,
        "Event check-in"
    );
    storage
        .get_check_in(id)?
        .ok_or_else(|| Error::internal("check-in vanished after insert"))
}

/// Sign a member up for an event.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown event,
/// [`Error::AlreadyRegistered`] for an active registration and
/// [`Error::EventFull`] when the limit is reached.
pub fn register(storage: &Storage, user: &User, event_id: i64, now: DateTime<Utc>) -> Result<()> {
    let event = storage
        .get_event(event_id)?
        .ok_or_else(|| Error::not_found("event"))?;

    if let Some(existing) = storage.user_registration(user.id, event.id)? {
        if existing.status.is_active() {
            return Err(Error::AlreadyRegistered);
        }
    }

    if event.is_limited()
        && storage.count_active_registrations(event.id)? >= i64::from(event.max_participants)
    {
        return Err(Error::EventFull {
            max: event.max_participants,
        });
    }

    storage.register_for_event(event.id, user.id, now)?;
    info!(user = %user.username, event = event.id, "Registered");
    Ok(())
}

/// Withdraw a member's registration.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown event and
/// [`Error::NotRegistered`] without an active registration.
pub fn cancel(storage: &Storage, user: &User, event_id: i64) -> Result<()> {
    let event = storage
        .get_event(event_id)?
        .ok_or_else(|| Error::not_found("event"))?;

    match storage.user_registration(user.id, event.id)? {
        Some(registration) if registration.status.is_active() => {
            storage.cancel_registration(event.id, user.id)?;
            info!(user = %user.username, event = event.id, "Registration cancelled");
            Ok(())
        }
        _ => Err(Error::NotRegistered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckInStatus;
    use crate::storage::test_support::{add_user, at, draft, storage};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn taipei() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn user(storage: &Storage, name: &str) -> User {
        let id = add_user(storage, name);
        storage.get_user(id).unwrap().unwrap()
    }

    #[test]
    fn test_local_day_bounds_utc() {
        let (start, end) = local_day_bounds(at(2025, 3, 1, 15, 30), utc());
        assert_eq!(start, at(2025, 3, 1, 0, 0));
        assert_eq!(end, at(2025, 3, 2, 0, 0));
    }

    #[test]
    fn test_local_day_bounds_with_offset() {
        // 20:00 UTC on Mar 1 is 04:00 on Mar 2 at +08:00.
        let (start, end) = local_day_bounds(at(2025, 3, 1, 20, 0), taipei());
        assert_eq!(start, at(2025, 3, 1, 16, 0));
        assert_eq!(end, at(2025, 3, 2, 16, 0));
    }

    #[test]
    fn test_parse_local_datetime() {
        assert_eq!(
            parse_local_datetime("2025-03-01T09:30", taipei()).unwrap(),
            at(2025, 3, 1, 1, 30)
        );
        assert_eq!(
            parse_local_datetime("2025-03-01T09:30:00", utc()).unwrap(),
            at(2025, 3, 1, 9, 30)
        );
        assert!(parse_local_datetime("03/01/2025", utc()).is_err());
        assert!(parse_local_datetime("", utc()).is_err());
    }

    #[test]
    fn test_format_local_datetime() {
        assert_eq!(
            format_local_datetime(at(2025, 3, 1, 1, 30), taipei()),
            "2025-03-01T09:30"
        );
    }

    #[test]
    fn test_check_in_once_per_day() {
        let storage = storage();
        let amy = user(&storage, "amy");

        let first = check_in(&storage, &amy, "Office", "", at(2025, 3, 1, 8, 0), utc()).unwrap();
        assert_eq!(first.status, CheckInStatus::CheckedIn);

        let err = check_in(&storage, &amy, "Office", "", at(2025, 3, 1, 12, 0), utc()).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedIn));

        assert!(check_in(&storage, &amy, "Office", "", at(2025, 3, 2, 8, 0), utc()).is_ok());
    }

    #[test]
    fn test_check_in_after_checkout_still_rejected() {
        let storage = storage();
        let amy = user(&storage, "amy");
        check_in(&storage, &amy, "", "", at(2025, 3, 1, 8, 0), utc()).unwrap();
        check_out(&storage, &amy, at(2025, 3, 1, 17, 0), utc()).unwrap();

        let err = check_in(&storage, &amy, "", "", at(2025, 3, 1, 18, 0), utc()).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedIn));
    }

    #[test]
    fn test_local_day_follows_offset() {
        let storage = storage();
        let amy = user(&storage, "amy");
        // 15:00 UTC and 17:00 UTC straddle midnight at +08:00.
        check_in(&storage, &amy, "", "", at(2025, 3, 1, 15, 0), taipei()).unwrap();
        assert!(check_in(&storage, &amy, "", "", at(2025, 3, 1, 17, 0), taipei()).is_ok());
    }

    #[test]
    fn test_check_out_rules() {
        let storage = storage();
        let amy = user(&storage, "amy");

        let err = check_out(&storage, &amy, at(2025, 3, 1, 17, 0), utc()).unwrap_err();
        assert!(matches!(err, Error::NotCheckedIn));

        check_in(&storage, &amy, "", "", at(2025, 3, 1, 8, 0), utc()).unwrap();
        let closed = check_out(&storage, &amy, at(2025, 3, 1, 17, 0), utc()).unwrap();
        assert_eq!(closed.status, CheckInStatus::CheckedOut);
        assert_eq!(closed.check_out_time, Some(at(2025, 3, 1, 17, 0)));

        let err = check_out(&storage, &amy, at(2025, 3, 1, 18, 0), utc()).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedOut));
    }

    #[test]
    fn test_event_check_in_self() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let bob = user(&storage, "bob");
        let event = storage
            .create_event(&draft(bob.id, at(2025, 3, 1, 9, 0)), at(2025, 2, 1, 0, 0))
            .unwrap();

        let request = EventCheckIn {
            event_id: event,
            ..EventCheckIn::default()
        };
        let check_in = event_check_in(&storage, &amy, &request, at(2025, 3, 1, 9, 5)).unwrap();
        assert_eq!(check_in.user_id, amy.id);
        assert_eq!(check_in.event_id, Some(event));
        assert_eq!(check_in.location.as_deref(), Some("Main hall"));

        let err = event_check_in(&storage, &amy, &request, at(2025, 3, 1, 9, 6)).unwrap_err();
        assert!(matches!(err, Error::AlreadyCheckedInEvent));
    }

    #[test]
    fn test_event_check_in_does_not_block_daily() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let event = storage
            .create_event(&draft(amy.id, at(2025, 3, 1, 9, 0)), at(2025, 2, 1, 0, 0))
            .unwrap();
        let request = EventCheckIn {
            event_id: event,
            ..EventCheckIn::default()
        };
        event_check_in(&storage, &amy, &request, at(2025, 3, 1, 9, 5)).unwrap();

        assert!(check_in(&storage, &amy, "", "", at(2025, 3, 1, 10, 0), utc()).is_ok());
    }

    #[test]
    fn test_event_check_in_unknown_event() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let request = EventCheckIn {
            event_id: 77,
            ..EventCheckIn::default()
        };
        let err = event_check_in(&storage, &amy, &request, at(2025, 3, 1, 9, 5)).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "event" }));
    }

    #[test]
    fn test_event_check_in_for_others_needs_rights() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let bob = user(&storage, "bob");
        let carol = user(&storage, "carol");
        let event = storage
            .create_event(&draft(bob.id, at(2025, 3, 1, 9, 0)), at(2025, 2, 1, 0, 0))
            .unwrap();

        let for_carol = EventCheckIn {
            event_id: event,
            target_user: Some(carol.id),
            location: "Door".to_string(),
            notes: "late".to_string(),
        };
        let err = event_check_in(&storage, &amy, &for_carol, at(2025, 3, 1, 9, 5)).unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));

        let check_in = event_check_in(&storage, &bob, &for_carol, at(2025, 3, 1, 9, 5)).unwrap();
        assert_eq!(check_in.user_id, carol.id);
        assert_eq!(check_in.location.as_deref(), Some("Door"));

        let ghost = EventCheckIn {
            target_user: Some(999),
            ..for_carol
        };
        let err = event_check_in(&storage, &bob, &ghost, at(2025, 3, 1, 9, 5)).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "user" }));
    }

    #[test]
    fn test_event_check_in_marks_registration_attended() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let event = storage
            .create_event(&draft(amy.id, at(2025, 3, 1, 9, 0)), at(2025, 2, 1, 0, 0))
            .unwrap();
        register(&storage, &amy, event, at(2025, 2, 2, 0, 0)).unwrap();

        let request = EventCheckIn {
            event_id: event,
            ..EventCheckIn::default()
        };
        event_check_in(&storage, &amy, &request, at(2025, 3, 1, 9, 5)).unwrap();

        let registration = storage.user_registration(amy.id, event).unwrap().unwrap();
        assert_eq!(registration.status, RegistrationStatus::Attended);
    }

    #[test]
    fn test_register_and_cancel() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let event = storage
            .create_event(&draft(amy.id, at(2025, 3, 1, 9, 0)), at(2025, 2, 1, 0, 0))
            .unwrap();

        register(&storage, &amy, event, at(2025, 2, 2, 0, 0)).unwrap();
        let err = register(&storage, &amy, event, at(2025, 2, 2, 1, 0)).unwrap_err();
        assert!(matches!(err, Error::AlreadyRegistered));

        cancel(&storage, &amy, event).unwrap();
        let err = cancel(&storage, &amy, event).unwrap_err();
        assert!(matches!(err, Error::NotRegistered));

        assert!(register(&storage, &amy, event, at(2025, 2, 3, 0, 0)).is_ok());
    }

    #[test]
    fn test_register_full_event() {
        let storage = storage();
        let amy = user(&storage, "amy");
        let bob = user(&storage, "bob");
        let mut limited = draft(amy.id, at(2025, 3, 1, 9, 0));
        limited.max_participants = 1;
        let event = storage.create_event(&limited, at(2025, 2, 1, 0, 0)).unwrap();

        register(&storage, &amy, event, at(2025, 2, 2, 0, 0)).unwrap();
        let err = register(&storage, &bob, event, at(2025, 2, 2, 0, 0)).unwrap_err();
        assert!(matches!(err, Error::EventFull { max: 1 }));

        cancel(&storage, &amy, event).unwrap();
        assert!(register(&storage, &bob, event, at(2025, 2, 2, 0, 0)).is_ok());
    }

    #[test]
    fn test_cancel_unknown_event() {
        let storage = storage();
        let amy = user(&storage, "amy");
        assert!(matches!(
            cancel(&storage, &amy, 5).unwrap_err(),
            Error::NotFound { .. }
        ));
    }
}
