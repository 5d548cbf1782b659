//! Server-rendered page handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use super::session::{FlashKind, PageUser, Session};
use super::views::{self, EventDetail};
use super::{hash_blocking, verify_blocking, AppState, PageError};
use crate::error::Error;
use crate::models::{NewUser, ProfileUpdate};
use crate::stats::{AdminOverview, Dashboard, MemberSummary, ProfileSummary};

type PageResult = Result<Response, PageError>;

/// Flash client errors for the next page; pass server errors through.
fn flash_rejection(session: &Session, err: Error) -> Result<(), PageError> {
    if err.is_client_error() {
        session.flash(FlashKind::Error, err.to_string());
        Ok(())
    } else {
        Err(PageError(err))
    }
}

fn redirect(to: &str) -> PageResult {
    Ok(Redirect::to(to).into_response())
}

pub async fn dashboard(
    State(state): State<AppState>,
    session: Session,
    PageUser(user): PageUser,
) -> PageResult {
    let offset = state.offset();
    let dashboard = Dashboard::build(&state.storage.lock(), &user, Utc::now(), offset)?;
    Ok(views::dashboard_page(&user, &dashboard, offset, &session.take_flashes()).into_response())
}

pub async fn login_form(session: Session) -> Response {
    views::login_page(&session.take_flashes()).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> PageResult {
    let username = form.username.trim();
    let user = state.storage.lock().get_user_by_username(username)?;

    let verified = match &user {
        Some(user) => verify_blocking(user.password_hash.clone(), form.password).await?,
        None => false,
    };

    match user.filter(|_| verified) {
        Some(user) => {
            session.log_in(user.id);
            session.flash(FlashKind::Success, format!("Welcome back, {}", user.name));
            info!(user = %user.username, "Logged in");
            redirect("/")
        }
        None => {
            warn!(username, "Failed login");
            session.flash(FlashKind::Error, Error::InvalidCredentials.to_string());
            Ok(views::login_page(&session.take_flashes()).into_response())
        }
    }
}

pub async fn logout(session: Session) -> Response {
    session.clear();
    session.flash(FlashKind::Info, "You have been logged out");
    Redirect::to("/login").into_response()
}

pub async fn register_form(session: Session) -> Response {
    views::register_page(&session.take_flashes()).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    username: String,
    password: String,
    name: String,
    email: String,
    phone: String,
    line_id: String,
    position: String,
}

pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> PageResult {
    let mut new_user = NewUser {
        username: form.username.trim().to_string(),
        name: form.name.trim().to_string(),
        email: form.email,
        phone: form.phone,
        line_id: form.line_id,
        position: form.position,
        ..NewUser::default()
    };

    let checked = new_user.validate().and_then(|()| {
        if form.password.is_empty() {
            Err(Error::validation("please fill in all required fields"))
        } else {
            Ok(())
        }
    });
    if let Err(e) = checked {
        flash_rejection(&session, e)?;
        return Ok(views::register_page(&session.take_flashes()).into_response());
    }

    new_user.password_hash =
        hash_blocking(form.password, state.config.auth.password_iterations).await?;
    let created = state.storage.lock().create_user(&new_user, Utc::now());
    match created {
        Ok(id) => {
            info!(user = %new_user.username, id, "Registered");
            session.flash(FlashKind::Success, "Registration complete, please log in");
            redirect("/login")
        }
        Err(e) => {
            flash_rejection(&session, e)?;
            Ok(views::register_page(&session.take_flashes()).into_response())
        }
    }
}

pub async fn profile(
    State(state): State<AppState>,
    session: Session,
    PageUser(user): PageUser,
) -> PageResult {
    let summary = ProfileSummary::build(&state.storage.lock(), &user)?;
    Ok(views::profile_page(&user, &summary, state.offset(), &session.take_flashes()).into_response())
}

pub async fn edit_profile_form(session: Session, PageUser(user): PageUser) -> Response {
    views::edit_profile_page(&user, &session.take_flashes()).into_response()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    name: String,
    email: String,
    phone: String,
    line_id: String,
    position: String,
    bio: String,
    new_password: String,
}

pub async fn edit_profile(
    State(state): State<AppState>,
    session: Session,
    PageUser(user): PageUser,
    Form(form): Form<ProfileForm>,
) -> PageResult {
    let update = ProfileUpdate {
        name: form.name,
        email: form.email,
        phone: form.phone,
        line_id: form.line_id,
        position: form.position,
        bio: form.bio,
    };

    let saved = update
        .validate(user.position.as_deref())
        .and_then(|()| state.storage.lock().update_profile(user.id, &update));
    if let Err(e) = saved {
        flash_rejection(&session, e)?;
        return redirect("/profile/edit");
    }

    if !form.new_password.is_empty() {
        let hash = hash_blocking(form.new_password, state.config.auth.password_iterations).await?;
        state.storage.lock().set_password(user.id, &hash)?;
    }

    info!(user = %user.username, "Profile updated");
    session.flash(FlashKind::Success, "Profile updated");
    redirect("/profile")
}

pub async fn member_profile(
    State(state): State<AppState>,
    session: Session,
    PageUser(viewer): PageUser,
    Path(id): Path<i64>,
) -> PageResult {
    let found = {
        let storage = state.storage.lock();
        match storage.get_user(id)? {
            Some(member) => {
                let summary = MemberSummary::build(&storage, &member)?;
                Some((member, summary))
            }
            None => None,
        }
    };

    let Some((member, summary)) = found else {
        session.flash(FlashKind::Error, Error::not_found("user").to_string());
        return redirect("/events");
    };
    Ok(views::member_page(
        &viewer,
        &member,
        &summary,
        state.offset(),
        &session.take_flashes(),
    )
    .into_response())
}

pub async fn events(
    State(state): State<AppState>,
    session: Session,
    PageUser(viewer): PageUser,
) -> PageResult {
    let (events, organizers) = {
        let storage = state.storage.lock();
        let organizers: HashMap<i64, String> = storage
            .list_users()?
            .into_iter()
            .map(|user| (user.id, user.name))
            .collect();
        (storage.list_events()?, organizers)
    };
    Ok(views::events_page(
        &viewer,
        &events,
        &organizers,
        state.offset(),
        &session.take_flashes(),
    )
    .into_response())
}

pub async fn event_detail(
    State(state): State<AppState>,
    session: Session,
    PageUser(viewer): PageUser,
    Path(id): Path<i64>,
) -> PageResult {
    let loaded = {
        let storage = state.storage.lock();
        match storage.get_event(id)? {
            Some(event) => {
                let organizer = match event.organizer_id {
                    Some(organizer_id) => storage.get_user(organizer_id)?.map(|u| u.name),
                    None => None,
                };
                Some((
                    storage.event_check_in(viewer.id, event.id)?,
                    storage.user_registration(viewer.id, event.id)?,
                    storage.event_participants(event.id)?,
                    storage.count_active_registrations(event.id)?,
                    organizer,
                    event,
                ))
            }
            None => None,
        }
    };

    let Some((my_check_in, my_registration, participants, registration_count, organizer, event)) =
        loaded
    else {
        session.flash(FlashKind::Error, Error::not_found("event").to_string());
        return redirect("/events");
    };

    let detail = EventDetail {
        event: &event,
        organizer: organizer.as_deref(),
        my_check_in: my_check_in.as_ref(),
        my_registration: my_registration.as_ref(),
        participants: &participants,
        registration_count,
    };
    Ok(views::event_page(&viewer, &detail, state.offset(), &session.take_flashes()).into_response())
}

pub async fn admin(
    State(state): State<AppState>,
    session: Session,
    PageUser(viewer): PageUser,
) -> PageResult {
    if !viewer.is_admin {
        session.flash(FlashKind::Error, Error::PermissionDenied.to_string());
        return redirect("/");
    }

    let (overview, users) = {
        let storage = state.storage.lock();
        (
            AdminOverview::build(&storage, state.config.attendance.window_days)?,
            storage.list_users()?,
        )
    };
    Ok(views::admin_page(
        &viewer,
        &overview,
        &users,
        state.offset(),
        &session.take_flashes(),
    )
    .into_response())
}
