//! HTML rendering.
//!
//! Pages are assembled from small string builders around one shared
//! layout. Every interpolated value goes through [`escape`].

use std::collections::HashMap;
use std::fmt::Write as _;

use axum::response::Html;
use chrono::{DateTime, FixedOffset, Utc};

use super::session::Flash;
use crate::attendance::format_local_datetime;
use crate::models::{
    CheckIn, CheckInRecord, Event, EventRegistration, Permission, User, POSITION_OPTIONS,
};
use crate::stats::{AdminOverview, Dashboard, MemberSummary, ProfileSummary};

/// Escape text for use in HTML content and attribute values.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn opt(text: Option<&str>) -> String {
    text.map(escape).unwrap_or_default()
}

fn time(value: DateTime<Utc>, offset: FixedOffset) -> String {
    value
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn avatar_img(user: &User) -> String {
    match user.avatar.as_deref() {
        Some(file) => format!(
            r#"<img class="avatar" src="/static/avatars/{}" alt="{}">"#,
            escape(file),
            escape(&user.name)
        ),
        None => String::new(),
    }
}

/// Wrap `body` in the site layout with navigation and flash messages.
#[must_use]
pub fn layout(title: &str, viewer: Option<&User>, flashes: &[Flash], body: &str) -> Html<String> {
    let mut nav = String::new();
    match viewer {
        Some(user) => {
            nav.push_str(r#"<a href="/">Dashboard</a> <a href="/events">Events</a> <a href="/profile">Profile</a>"#);
            if user.is_admin {
                nav.push_str(r#" <a href="/admin">Admin</a>"#);
            }
            let _ = write!(
                nav,
                r#" <span class="who">{}</span> <a href="/logout">Log out</a>"#,
                escape(&user.name)
            );
        }
        None => nav.push_str(r#"<a href="/login">Log in</a> <a href="/register">Register</a>"#),
    }

    let mut messages = String::new();
    for flash in flashes {
        let _ = write!(
            messages,
            r#"<div class="flash {}">{}</div>"#,
            flash.kind.as_str(),
            escape(&flash.message)
        );
    }

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title} - rollcall</title>
</head>
<body>
<nav>{nav}</nav>
<main>
{messages}
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
    ))
}

/// Login form.
#[must_use]
pub fn login_page(flashes: &[Flash]) -> Html<String> {
    let body = r#"<form method="post" action="/login">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">Log in</button>
</form>
<p>No account yet? <a href="/register">Register</a></p>"#;
    layout("Log in", None, flashes, body)
}

fn position_select(current: Option<&str>) -> String {
    let mut select = String::from(r#"<select name="position"><option value="">(none)</option>"#);
    if let Some(legacy) = current.filter(|c| !c.is_empty() && !POSITION_OPTIONS.contains(c)) {
        let _ = write!(
            select,
            r#"<option value="{0}" selected>{0}</option>"#,
            escape(legacy)
        );
    }
    for option in POSITION_OPTIONS {
        let selected = if current == Some(*option) { " selected" } else { "" };
        let _ = write!(
            select,
            r#"<option value="{0}"{selected}>{0}</option>"#,
            escape(option)
        );
    }
    select.push_str("</select>");
    select
}

/// Self-registration form.
#[must_use]
pub fn register_page(flashes: &[Flash]) -> Html<String> {
    let body = format!(
        r#"<form method="post" action="/register">
<label>Username <input name="username" required maxlength="80"></label>
<label>Password <input name="password" type="password" required></label>
<label>Name <input name="name" required maxlength="100"></label>
<label>Email <input name="email" type="email"></label>
<label>Phone <input name="phone"></label>
<label>LINE ID <input name="line_id"></label>
<label>Position {}</label>
<button type="submit">Register</button>
</form>"#,
        position_select(None)
    );
    layout("Register", None, flashes, &body)
}

fn event_rows(events: &[Event], offset: FixedOffset) -> String {
    let mut rows = String::new();
    for event in events {
        let _ = write!(
            rows,
            r#"<li><a href="/event/{}">{}</a> {} @ {}</li>"#,
            event.id,
            escape(&event.title),
            time(event.start_time, offset),
            escape(&event.location)
        );
    }
    if rows.is_empty() {
        rows.push_str("<li>None</li>");
    }
    format!("<ul>{rows}</ul>")
}

fn check_in_rows(check_ins: &[CheckIn], offset: FixedOffset) -> String {
    let mut rows = String::new();
    for check_in in check_ins {
        let out = check_in
            .check_out_time
            .map(|t| time(t, offset))
            .unwrap_or_default();
        let kind = match check_in.event_id {
            Some(id) => format!(r#"<a href="/event/{id}">event</a>"#),
            None => "daily".to_string(),
        };
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{out}</td><td>{kind}</td><td>{}</td><td>{}</td></tr>",
            time(check_in.check_in_time, offset),
            opt(check_in.location.as_deref()),
            check_in.status
        );
    }
    format!(
        "<table><tr><th>In</th><th>Out</th><th>Kind</th><th>Location</th><th>Status</th></tr>{rows}</table>"
    )
}

fn record_rows(records: &[CheckInRecord], offset: FixedOffset) -> String {
    let mut rows = String::new();
    for record in records {
        let _ = write!(
            rows,
            r#"<tr><td><a href="/user/{}">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>"#,
            record.check_in.user_id,
            escape(&record.user_name),
            time(record.check_in.check_in_time, offset),
            opt(record.check_in.location.as_deref()),
            record.check_in.status
        );
    }
    format!(
        "<table><tr><th>Member</th><th>Time</th><th>Location</th><th>Status</th></tr>{rows}</table>"
    )
}

/// Member dashboard.
#[must_use]
pub fn dashboard_page(
    user: &User,
    dashboard: &Dashboard,
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let today = match &dashboard.today {
        Some(check_in) => match check_in.check_out_time {
            Some(out) => format!(
                "<p>Checked in at {} and out at {}.</p>",
                time(check_in.check_in_time, offset),
                time(out, offset)
            ),
            None => format!(
                r#"<p>Checked in at {}.</p>
<form method="post" action="/checkout"><button type="submit">Check out</button></form>"#,
                time(check_in.check_in_time, offset)
            ),
        },
        None => r#"<form method="post" action="/checkin">
<label>Location <input name="location"></label>
<label>Notes <input name="notes"></label>
<button type="submit">Check in</button>
</form>"#
            .to_string(),
    };

    let body = format!(
        r#"{avatar}<p>Welcome, {name}.</p>
<section><h2>Today</h2>{today}</section>
<section><h2>This month</h2>
<p>Check-ins: {checkins}</p>
<p>Events: {events}</p>
<p>Attendance rate: {rate:.1}%</p>
</section>
<section><h2>Upcoming events</h2>{upcoming}</section>"#,
        avatar = avatar_img(user),
        name = escape(&user.name),
        checkins = dashboard.checkins_this_month,
        events = dashboard.events_this_month,
        rate = dashboard.attendance_rate,
        upcoming = event_rows(&dashboard.upcoming, offset),
    );
    layout("Dashboard", Some(user), flashes, &body)
}

fn profile_fields(user: &User) -> String {
    format!(
        "<dl><dt>Username</dt><dd>{}</dd><dt>Email</dt><dd>{}</dd><dt>Phone</dt><dd>{}</dd>\
         <dt>LINE ID</dt><dd>{}</dd><dt>Position</dt><dd>{}</dd><dt>About</dt><dd>{}</dd></dl>",
        escape(&user.username),
        opt(user.email.as_deref()),
        opt(user.phone.as_deref()),
        opt(user.line_id.as_deref()),
        opt(user.position.as_deref()),
        opt(user.bio.as_deref()),
    )
}

/// The viewer's own profile.
#[must_use]
pub fn profile_page(
    user: &User,
    summary: &ProfileSummary,
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let body = format!(
        r#"{avatar}{fields}
<p><a href="/profile/edit">Edit profile</a></p>
<form method="post" action="/upload_avatar" enctype="multipart/form-data">
<input type="file" name="avatar" accept="image/*"><button type="submit">Upload avatar</button>
</form>
<p>Check-ins: {checkins} | Events organized: {organized} | Registrations: {registrations}</p>
<h2>Recent check-ins</h2>{recent}"#,
        avatar = avatar_img(user),
        fields = profile_fields(user),
        checkins = summary.checkin_count,
        organized = summary.organized_count,
        registrations = summary.registration_count,
        recent = check_in_rows(&summary.recent, offset),
    );
    layout(&user.name, Some(user), flashes, &body)
}

/// Form for editing the viewer's profile.
#[must_use]
pub fn edit_profile_page(user: &User, flashes: &[Flash]) -> Html<String> {
    let body = format!(
        r#"<form method="post" action="/profile/edit">
<label>Name <input name="name" value="{name}" required maxlength="100"></label>
<label>Email <input name="email" type="email" value="{email}"></label>
<label>Phone <input name="phone" value="{phone}"></label>
<label>LINE ID <input name="line_id" value="{line_id}"></label>
<label>Position {position}</label>
<label>About <textarea name="bio">{bio}</textarea></label>
<label>New password <input name="new_password" type="password"></label>
<button type="submit">Save</button>
</form>"#,
        name = escape(&user.name),
        email = opt(user.email.as_deref()),
        phone = opt(user.phone.as_deref()),
        line_id = opt(user.line_id.as_deref()),
        position = position_select(user.position.as_deref()),
        bio = opt(user.bio.as_deref()),
    );
    layout("Edit profile", Some(user), flashes, &body)
}

/// Another member's public profile.
#[must_use]
pub fn member_page(
    viewer: &User,
    member: &User,
    summary: &MemberSummary,
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let body = format!(
        r#"{avatar}{fields}
<p>Check-ins: {checkins} | Absent: {absent} | Attendance rate: {rate:.1}%</p>
<h2>Organized events</h2>{organized}"#,
        avatar = avatar_img(member),
        fields = profile_fields(member),
        checkins = summary.checkin_count,
        absent = summary.absent_count,
        rate = summary.attendance_rate,
        organized = event_rows(&summary.organized, offset),
    );
    layout(&member.name, Some(viewer), flashes, &body)
}

fn event_form(action: &str, event: Option<&Event>, offset: FixedOffset) -> String {
    let value = |f: &dyn Fn(&Event) -> String| event.map(f).unwrap_or_default();
    format!(
        r#"<form method="post" action="{action}">
<label>Title <input name="title" value="{title}" required></label>
<label>Description <textarea name="description">{description}</textarea></label>
<label>Location <input name="location" value="{location}" required></label>
<label>Start <input name="start_time" type="datetime-local" value="{start}" required></label>
<label>End <input name="end_time" type="datetime-local" value="{end}" required></label>
<label>Max participants <input name="max_participants" type="number" min="0" value="{max}"></label>
<label>Organizer id <input name="organizer_id" value="{organizer}"></label>
<button type="submit">Save</button>
</form>"#,
        action = escape(action),
        title = value(&|e| escape(&e.title)),
        description = value(&|e| opt(e.description.as_deref())),
        location = value(&|e| escape(&e.location)),
        start = value(&|e| format_local_datetime(e.start_time, offset)),
        end = value(&|e| format_local_datetime(e.end_time, offset)),
        max = value(&|e| e.max_participants.to_string()),
        organizer = value(&|e| e.organizer_id.map(|id| id.to_string()).unwrap_or_default()),
    )
}

/// Event list with the controls the viewer may use.
#[must_use]
pub fn events_page(
    viewer: &User,
    events: &[Event],
    organizers: &HashMap<i64, String>,
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let mut rows = String::new();
    for event in events {
        let organizer = event
            .organizer_id
            .and_then(|id| organizers.get(&id))
            .map(|name| escape(name))
            .unwrap_or_default();
        let mut controls = String::new();
        if viewer.can_modify_event(event, Permission::EditEvents) {
            let _ = write!(
                controls,
                r#"<details><summary>Edit</summary>{}</details>"#,
                event_form(&format!("/admin/events/edit/{}", event.id), Some(event), offset)
            );
        }
        if viewer.can_modify_event(event, Permission::DeleteEvents) {
            let _ = write!(
                controls,
                r#"<form method="post" action="/admin/events/delete/{}"><button type="submit">Delete</button></form>"#,
                event.id
            );
        }
        let _ = write!(
            rows,
            r#"<tr><td><a href="/event/{id}">{title}</a></td><td>{start}</td><td>{end}</td><td>{location}</td><td>{organizer}</td><td>{controls}</td></tr>"#,
            id = event.id,
            title = escape(&event.title),
            start = time(event.start_time, offset),
            end = time(event.end_time, offset),
            location = escape(&event.location),
        );
    }

    let add = if viewer.has_permission(Permission::AddEvents) {
        format!(
            "<details><summary>New event</summary>{}</details>",
            event_form("/admin/events/add", None, offset)
        )
    } else {
        String::new()
    };

    let body = format!(
        "{add}<table><tr><th>Title</th><th>Start</th><th>End</th><th>Location</th>\
         <th>Organizer</th><th></th></tr>{rows}</table>"
    );
    layout("Events", Some(viewer), flashes, &body)
}

/// Everything shown on an event's detail page.
#[derive(Debug)]
pub struct EventDetail<'a> {
    /// The event.
    pub event: &'a Event,
    /// Organizer display name.
    pub organizer: Option<&'a str>,
    /// The viewer's check-in.
    pub my_check_in: Option<&'a CheckIn>,
    /// The viewer's registration.
    pub my_registration: Option<&'a EventRegistration>,
    /// Everyone checked in.
    pub participants: &'a [CheckInRecord],
    /// Active registrations.
    pub registration_count: i64,
}

/// Event detail page.
#[must_use]
pub fn event_page(
    viewer: &User,
    detail: &EventDetail<'_>,
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let event = detail.event;
    let limit = if event.is_limited() {
        format!("{} / {}", detail.registration_count, event.max_participants)
    } else {
        format!("{} (no limit)", detail.registration_count)
    };

    let check_in = match detail.my_check_in {
        Some(c) => format!("<p>You checked in at {}.</p>", time(c.check_in_time, offset)),
        None => format!(
            r#"<form method="post" action="/event/{}/checkin">
<label>Location <input name="location" placeholder="{}"></label>
<label>Notes <input name="notes"></label>
<button type="submit">Check in</button>
</form>"#,
            event.id,
            escape(&event.location)
        ),
    };

    let registration = match detail.my_registration.filter(|r| r.status.is_active()) {
        Some(r) => format!(
            r#"<p>Registration: {}</p><form method="post" action="/event/{}/cancel"><button type="submit">Cancel registration</button></form>"#,
            r.status, event.id
        ),
        None => format!(
            r#"<form method="post" action="/event/{}/register"><button type="submit">Register</button></form>"#,
            event.id
        ),
    };

    let body = format!(
        r#"<p>{description}</p>
<dl><dt>Location</dt><dd>{location}</dd><dt>Start</dt><dd>{start}</dd><dt>End</dt><dd>{end}</dd>
<dt>Organizer</dt><dd>{organizer}</dd><dt>Registered</dt><dd>{limit}</dd></dl>
{registration}{check_in}
<h2>Participants ({count})</h2>{participants}"#,
        description = opt(event.description.as_deref()),
        location = escape(&event.location),
        start = time(event.start_time, offset),
        end = time(event.end_time, offset),
        organizer = opt(detail.organizer),
        count = detail.participants.len(),
        participants = record_rows(detail.participants, offset),
    );
    layout(&event.title, Some(viewer), flashes, &body)
}

/// Admin overview.
#[must_use]
pub fn admin_page(
    viewer: &User,
    overview: &AdminOverview,
    users: &[User],
    offset: FixedOffset,
    flashes: &[Flash],
) -> Html<String> {
    let mut user_rows = String::new();
    for user in users {
        let _ = write!(
            user_rows,
            r#"<tr><td><a href="/user/{id}">{username}</a></td><td>{name}</td><td>{position}</td><td>{admin}</td><td><form method="post" action="/admin/users/delete/{id}"><button type="submit">Delete</button></form></td></tr>"#,
            id = user.id,
            username = escape(&user.username),
            name = escape(&user.name),
            position = opt(user.position.as_deref()),
            admin = if user.is_admin { "yes" } else { "" },
        );
    }

    let body = format!(
        r#"<section><p>Members: {users} | Events: {events} | Check-ins: {checkins} | Attendance rate: {rate}%</p>
<form method="post" action="/admin/events/fix_organizers"><button type="submit">Assign missing organizers</button></form></section>
<section><h2>Members</h2><table><tr><th>Username</th><th>Name</th><th>Position</th><th>Admin</th><th></th></tr>{user_rows}</table></section>
<section><h2>Recent events</h2>{recent_events}</section>
<section><h2>Recent check-ins</h2>{recent_checkins}</section>"#,
        users = overview.total_users,
        events = overview.total_events,
        checkins = overview.total_checkins,
        rate = overview.attendance_rate,
        recent_events = event_rows(&overview.recent_events, offset),
        recent_checkins = record_rows(&overview.recent_checkins, offset),
    );
    layout("Administration", Some(viewer), flashes, &body)
}

/// Generic error page.
#[must_use]
pub fn error_page(message: &str) -> Html<String> {
    layout(
        "Something went wrong",
        None,
        &[],
        &format!(r#"<p>{}</p><p><a href="/">Back</a></p>"#, escape(message)),
    )
}
