//! Server-side sessions keyed by a cookie.
//!
//! A session carries the logged-in member id and queued flash messages. The
//! middleware attaches a [`Session`] handle to every request; handlers
//! extract it, or use [`CurrentUser`] / [`PageUser`] to require a login.
//!
//! Nothing is stored for a request until a handler logs a member in or
//! queues a flash message. Only then is a cookie issued.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AppState;
use crate::error::Error;
use crate::models::User;

/// Kind of a flash message, used as its CSS class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    /// Something worked.
    Success,
    /// Something was refused.
    Error,
    /// Neutral notice.
    Info,
}

impl FlashKind {
    /// Name used in markup.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Info => "info",
        }
    }
}

/// A message shown once on the next rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Flash {
    /// Kind of message.
    pub kind: FlashKind,
    /// Text shown to the member.
    pub message: String,
}

#[derive(Debug)]
struct SessionData {
    user_id: Option<i64>,
    flashes: Vec<Flash>,
    last_seen: Instant,
}

impl SessionData {
    fn new(now: Instant) -> Self {
        Self {
            user_id: None,
            flashes: Vec::new(),
            last_seen: now,
        }
    }
}

/// In-memory session table shared by all requests.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, SessionData>>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store whose sessions expire after `ttl` of inactivity.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Start a new empty session and return its id.
    #[must_use]
    pub fn create(&self) -> String {
        self.insert(SessionData::new(Instant::now()))
    }

    /// Store `data` under a fresh id, dropping expired sessions first.
    fn insert(&self, data: SessionData) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.lock();
        prune(&mut sessions, data.last_seen, self.ttl);
        sessions.insert(id.clone(), data);
        debug!(live = sessions.len(), "Created session");
        id
    }

    fn remove(&self, id: &str) -> Option<SessionData> {
        self.sessions.lock().remove(id)
    }

    /// Refresh a session; returns `false` if it is unknown or expired.
    #[must_use]
    pub fn touch(&self, id: &str) -> bool {
        self.touch_at(id, Instant::now())
    }

    fn touch_at(&self, id: &str, now: Instant) -> bool {
        let mut sessions = self.sessions.lock();
        prune(&mut sessions, now, self.ttl);
        match sessions.get_mut(id) {
            Some(data) => {
                data.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with<R>(&self, id: &str, f: impl FnOnce(&mut SessionData) -> R) -> Option<R> {
        self.sessions.lock().get_mut(id).map(f)
    }
}

fn prune(sessions: &mut HashMap<String, SessionData>, now: Instant, ttl: Duration) {
    sessions.retain(|_, data| now.saturating_duration_since(data.last_seen) <= ttl);
}

#[derive(Debug, Default)]
struct Handle {
    id: Option<String>,
    /// Set when the id must be sent back in a cookie.
    issued: bool,
}

/// Handle to the current request's session.
#[derive(Debug, Clone)]
pub struct Session {
    handle: Arc<Mutex<Handle>>,
    store: SessionStore,
}

impl Session {
    fn new(id: Option<String>, store: SessionStore) -> Self {
        Self {
            handle: Arc::new(Mutex::new(Handle { id, issued: false })),
            store,
        }
    }

    fn current_id(&self) -> Option<String> {
        self.handle.lock().id.clone()
    }

    /// The id to send in a cookie, if this request started a session.
    fn issued_id(&self) -> Option<String> {
        let handle = self.handle.lock();
        handle.id.clone().filter(|_| handle.issued)
    }

    fn ensure_id(&self) -> String {
        let mut handle = self.handle.lock();
        if let Some(id) = &handle.id {
            return id.clone();
        }
        let id = self.store.create();
        handle.id = Some(id.clone());
        handle.issued = true;
        id
    }

    /// The logged-in member id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        let id = self.current_id()?;
        self.store.with(&id, |data| data.user_id).flatten()
    }

    /// Mark the session as belonging to `user_id`.
    ///
    /// The session moves to a fresh id and the old one stops working.
    /// Pending flash messages move with it.
    pub fn log_in(&self, user_id: i64) {
        let mut handle = self.handle.lock();
        let now = Instant::now();
        let mut data = handle
            .id
            .take()
            .and_then(|old| self.store.remove(&old))
            .unwrap_or_else(|| SessionData::new(now));
        data.user_id = Some(user_id);
        data.last_seen = now;
        handle.id = Some(self.store.insert(data));
        handle.issued = true;
    }

    /// Forget the member and any pending messages.
    pub fn clear(&self) {
        if let Some(id) = self.current_id() {
            self.store.with(&id, |data| {
                data.user_id = None;
                data.flashes.clear();
            });
        }
    }

    /// Queue a message for the next page.
    pub fn flash(&self, kind: FlashKind, message: impl Into<String>) {
        let message = message.into();
        let id = self.ensure_id();
        self.store.with(&id, |data| {
            data.flashes.push(Flash { kind, message });
        });
    }

    /// Remove and return all queued messages.
    #[must_use]
    pub fn take_flashes(&self) -> Vec<Flash> {
        let Some(id) = self.current_id() else {
            return Vec::new();
        };
        self.store
            .with(&id, |data| std::mem::take(&mut data.flashes))
            .unwrap_or_default()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| Error::internal("session middleware is not installed"))
    }
}

/// Value of cookie `name` in the request headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Attach a session handle to the request.
///
/// The cookie is only set when a handler started or rotated the session.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.config.auth.session_cookie.clone();
    let existing = cookie_value(request.headers(), &cookie_name)
        .filter(|id| state.sessions.touch(id));

    let session = Session::new(existing, state.sessions.clone());
    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    if let Some(id) = session.issued_id() {
        let cookie = format!("{cookie_name}={id}; Path=/; HttpOnly; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Invalid session cookie"),
        }
    }
    response
}

/// Look up the member behind the session, clearing it if they are gone.
fn load_user(state: &AppState, session: &Session) -> Result<User, Error> {
    let id = session.user_id().ok_or(Error::NotAuthenticated)?;
    let user = state.storage.lock().get_user(id)?;
    user.ok_or_else(|| {
        debug!(id, "Session user no longer exists");
        session.clear();
        Error::NotAuthenticated
    })
}

/// The logged-in member, for JSON endpoints.
///
/// Rejects with [`Error::NotAuthenticated`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state).await?;
        load_user(state, &session).map(CurrentUser)
    }
}

/// The logged-in member, for HTML pages.
///
/// Redirects to the login page with a flash message when nobody is logged in.
#[derive(Debug, Clone)]
pub struct PageUser(pub User);

impl FromRequestParts<AppState> for PageUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|e| super::PageError(e).into_response())?;
        match load_user(state, &session) {
            Ok(user) => Ok(PageUser(user)),
            Err(Error::NotAuthenticated) => {
                session.flash(FlashKind::Error, Error::NotAuthenticated.to_string());
                Err(Redirect::to("/login").into_response())
            }
            Err(e) => Err(super::PageError(e).into_response()),
        }
    }
}
