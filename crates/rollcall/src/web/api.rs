//! JSON endpoints.
//!
//! Every answer carries `success` and `message`; failures go through
//! `IntoResponse for Error` and use the status of the error kind.

use axum::extract::{Multipart, Path, State};
use axum::{Form, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::session::CurrentUser;
use super::{hash_blocking, ok, AppState};
use crate::attendance::{self, parse_local_datetime, EventCheckIn};
use crate::error::{Error, Result};
use crate::models::{
    EventDraft, NewUser, Permission, PermissionFlags, ProfileUpdate, User, UserUpdate,
};

type ApiResult = Result<Json<Value>>;

fn require(user: &User, permission: Permission) -> Result<()> {
    if user.has_permission(permission) {
        Ok(())
    } else {
        Err(Error::PermissionDenied)
    }
}

fn require_admin(user: &User) -> Result<()> {
    if user.is_admin {
        Ok(())
    } else {
        Err(Error::PermissionDenied)
    }
}

/// Administrator accounts are only touched by administrators.
fn guard_admin_account(actor: &User, target: &User) -> Result<()> {
    if target.is_admin && !actor.is_admin {
        Err(Error::PermissionDenied)
    } else {
        Ok(())
    }
}

/// HTML checkboxes submit `on` when ticked and nothing otherwise.
fn checked(value: Option<&str>) -> bool {
    value == Some("on")
}

// === Attendance ===

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckInForm {
    location: String,
    notes: String,
}

pub async fn check_in(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<CheckInForm>,
) -> ApiResult {
    let check_in = attendance::check_in(
        &state.storage.lock(),
        &user,
        &form.location,
        &form.notes,
        Utc::now(),
        state.offset(),
    )?;
    Ok(Json(json!({
        "success": true,
        "message": "checked in",
        "check_in": check_in,
    })))
}

pub async fn check_out(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult {
    let check_in = attendance::check_out(&state.storage.lock(), &user, Utc::now(), state.offset())?;
    Ok(Json(json!({
        "success": true,
        "message": "checked out",
        "check_in": check_in,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventCheckInForm {
    checkin_user: String,
    location: String,
    notes: String,
}

pub async fn event_check_in(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<i64>,
    Form(form): Form<EventCheckInForm>,
) -> ApiResult {
    let target_user = match form.checkin_user.trim() {
        "" => None,
        raw => Some(
            raw.parse::<i64>()
                .map_err(|_| Error::validation(format!("invalid member id: {raw}")))?,
        ),
    };
    let request = EventCheckIn {
        event_id,
        target_user,
        location: form.location,
        notes: form.notes,
    };
    let check_in = attendance::event_check_in(&state.storage.lock(), &user, &request, Utc::now())?;
    Ok(Json(json!({
        "success": true,
        "message": "checked in to event",
        "check_in": check_in,
    })))
}

pub async fn register(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<i64>,
) -> ApiResult {
    attendance::register(&state.storage.lock(), &user, event_id, Utc::now())?;
    Ok(ok("registered for event"))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(event_id): Path<i64>,
) -> ApiResult {
    attendance::cancel(&state.storage.lock(), &user, event_id)?;
    Ok(ok("registration cancelled"))
}

// === Members ===

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult {
    require(&actor, Permission::ManageUsers)?;
    let users = state.storage.lock().list_users()?;
    Ok(Json(json!({ "success": true, "message": "ok", "users": users })))
}

pub async fn user_detail(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    require(&actor, Permission::ManageUsers)?;
    let user = state
        .storage
        .lock()
        .get_user(id)?
        .ok_or_else(|| Error::not_found("user"))?;
    Ok(Json(json!({ "success": true, "message": "ok", "user": user })))
}

pub async fn list_check_ins(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult {
    require_admin(&actor)?;
    let check_ins = state.storage.lock().recent_check_ins(usize::MAX)?;
    Ok(Json(json!({ "success": true, "message": "ok", "checkins": check_ins })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserForm {
    username: String,
    password: String,
    name: String,
    email: String,
    phone: String,
    line_id: String,
    position: String,
    bio: String,
    can_add_events: Option<String>,
    can_edit_events: Option<String>,
    can_delete_events: Option<String>,
    can_manage_users: Option<String>,
    is_admin: Option<String>,
}

impl UserForm {
    fn permissions(&self) -> PermissionFlags {
        PermissionFlags {
            add_events: checked(self.can_add_events.as_deref()),
            edit_events: checked(self.can_edit_events.as_deref()),
            delete_events: checked(self.can_delete_events.as_deref()),
            manage_users: checked(self.can_manage_users.as_deref()),
        }
    }

    fn is_admin(&self) -> bool {
        checked(self.is_admin.as_deref())
    }
}

pub async fn add_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Form(form): Form<UserForm>,
) -> ApiResult {
    require(&actor, Permission::ManageUsers)?;
    let is_admin = form.is_admin();
    if is_admin && !actor.is_admin {
        return Err(Error::PermissionDenied);
    }

    let mut new_user = NewUser {
        username: form.username.trim().to_string(),
        permissions: form.permissions(),
        name: form.name.trim().to_string(),
        email: form.email,
        phone: form.phone,
        line_id: form.line_id,
        position: form.position,
        is_admin,
        ..NewUser::default()
    };
    new_user.validate()?;
    if form.password.is_empty() {
        return Err(Error::validation("please fill in all required fields"));
    }

    new_user.password_hash =
        hash_blocking(form.password, state.config.auth.password_iterations).await?;
    let id = {
        let storage = state.storage.lock();
        let id = storage.create_user(&new_user, Utc::now())?;
        if !form.bio.trim().is_empty() {
            let profile = ProfileUpdate {
                name: new_user.name.clone(),
                email: new_user.email.clone(),
                phone: new_user.phone.clone(),
                line_id: new_user.line_id.clone(),
                position: new_user.position.clone(),
                bio: form.bio,
            };
            storage.update_profile(id, &profile)?;
        }
        id
    };

    info!(actor = %actor.username, user = %new_user.username, id, "Member added");
    Ok(Json(json!({ "success": true, "message": "member added", "user_id": id })))
}

pub async fn edit_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<UserForm>,
) -> ApiResult {
    require(&actor, Permission::ManageUsers)?;
    let target = state
        .storage
        .lock()
        .get_user(id)?
        .ok_or_else(|| Error::not_found("user"))?;

    guard_admin_account(&actor, &target)?;
    let is_admin = form.is_admin();
    if is_admin != target.is_admin && !actor.is_admin {
        return Err(Error::PermissionDenied);
    }

    let permissions = form.permissions();
    let update = UserUpdate {
        profile: ProfileUpdate {
            name: form.name,
            email: form.email,
            phone: form.phone,
            line_id: form.line_id,
            position: form.position,
            bio: form.bio,
        },
        permissions,
        is_admin,
    };
    update.profile.validate(target.position.as_deref())?;

    let password_hash = if form.password.is_empty() {
        None
    } else {
        Some(hash_blocking(form.password, state.config.auth.password_iterations).await?)
    };

    {
        let storage = state.storage.lock();
        storage.update_user(id, &update)?;
        if let Some(hash) = password_hash {
            storage.set_password(id, &hash)?;
        }
    }

    info!(actor = %actor.username, user = %target.username, "Member updated");
    Ok(ok("member updated"))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    require(&actor, Permission::ManageUsers)?;
    if id == actor.id {
        return Err(Error::CannotDeleteSelf);
    }

    let target = {
        let mut storage = state.storage.lock();
        let target = storage
            .get_user(id)?
            .ok_or_else(|| Error::not_found("user"))?;
        guard_admin_account(&actor, &target)?;
        storage.delete_user(id)?;
        target
    };
    if let Some(avatar) = target.avatar.as_deref() {
        state.avatars.remove(avatar);
    }

    info!(actor = %actor.username, user = %target.username, "Member deleted");
    Ok(ok("member deleted"))
}

// === Events ===

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventForm {
    title: String,
    description: String,
    location: String,
    start_time: String,
    end_time: String,
    max_participants: String,
    organizer_id: String,
}

impl EventForm {
    /// Parse the form into a draft, defaulting the organizer to `actor`.
    fn into_draft(self, state: &AppState, actor: &User) -> Result<EventDraft> {
        let offset = state.offset();
        let organizer_id = match self.organizer_id.trim() {
            "" => actor.id,
            raw => raw
                .parse::<i64>()
                .map_err(|_| Error::validation(format!("invalid organizer id: {raw}")))?,
        };
        if organizer_id != actor.id && state.storage.lock().get_user(organizer_id)?.is_none() {
            return Err(Error::not_found("organizer"));
        }
        let max_participants = match self.max_participants.trim() {
            "" => 0,
            raw => raw
                .parse::<u32>()
                .map_err(|_| Error::validation(format!("invalid participant limit: {raw}")))?,
        };

        let draft = EventDraft {
            title: self.title.trim().to_string(),
            description: self.description,
            location: self.location.trim().to_string(),
            organizer_id,
            start_time: parse_local_datetime(&self.start_time, offset)?,
            end_time: parse_local_datetime(&self.end_time, offset)?,
            max_participants,
        };
        draft.validate()?;
        Ok(draft)
    }
}

pub async fn add_event(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Form(form): Form<EventForm>,
) -> ApiResult {
    require(&actor, Permission::AddEvents)?;
    let draft = form.into_draft(&state, &actor)?;
    let id = state.storage.lock().create_event(&draft, Utc::now())?;

    info!(actor = %actor.username, id, title = %draft.title, "Event added");
    Ok(Json(json!({ "success": true, "message": "event added", "event_id": id })))
}

pub async fn edit_event(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Form(form): Form<EventForm>,
) -> ApiResult {
    let event = state
        .storage
        .lock()
        .get_event(id)?
        .ok_or_else(|| Error::not_found("event"))?;
    if !actor.can_modify_event(&event, Permission::EditEvents) {
        return Err(Error::PermissionDenied);
    }

    let draft = form.into_draft(&state, &actor)?;
    state.storage.lock().update_event(id, &draft)?;

    info!(actor = %actor.username, id, "Event updated");
    Ok(ok("event updated"))
}

pub async fn delete_event(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let mut storage = state.storage.lock();
    let event = storage
        .get_event(id)?
        .ok_or_else(|| Error::not_found("event"))?;
    if !actor.can_modify_event(&event, Permission::DeleteEvents) {
        return Err(Error::PermissionDenied);
    }
    storage.delete_event(id)?;
    drop(storage);

    info!(actor = %actor.username, id, title = %event.title, "Event deleted");
    Ok(ok("event deleted"))
}

pub async fn fix_organizers(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
) -> ApiResult {
    require_admin(&actor)?;
    let count = {
        let storage = state.storage.lock();
        let admin = storage
            .first_admin()?
            .ok_or_else(|| Error::not_found("admin"))?;
        storage.assign_missing_organizers(admin.id)?
    };
    Ok(Json(json!({
        "success": true,
        "message": format!("assigned an organizer to {count} events"),
        "fixed": count,
    })))
}

// === Avatars ===

pub async fn upload_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> ApiResult {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(e.body_text()))?
    {
        if field.name() != Some("avatar") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let (file_name, bytes) = upload.ok_or(Error::NoFileSelected)?;

    let avatar = state
        .avatars
        .save(&state.storage.lock(), &user, &file_name, &bytes, Utc::now())?;
    Ok(Json(json!({
        "success": true,
        "message": "avatar uploaded",
        "avatar": avatar,
    })))
}

pub async fn user_avatar(
    State(state): State<AppState>,
    CurrentUser(_viewer): CurrentUser,
    Path(id): Path<i64>,
) -> ApiResult {
    let user = state
        .storage
        .lock()
        .get_user(id)?
        .ok_or_else(|| Error::not_found("user"))?;
    Ok(Json(json!({
        "success": true,
        "message": "ok",
        "avatar": user.avatar,
        "name": user.name,
        "email": user.email,
        "phone": user.phone,
        "line_id": user.line_id,
        "position": user.position,
    })))
}

// === Diagnostics ===

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "rollcall",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "pong" }))
}

pub async fn info() -> Json<Value> {
    Json(json!({
        "app_name": "rollcall",
        "framework": "axum",
        "database": "SQLite",
        "version": env!("CARGO_PKG_VERSION"),
        "features": [
            "member registration and login",
            "daily check-in and check-out",
            "event management",
            "member profiles",
            "administration",
        ],
    }))
}
