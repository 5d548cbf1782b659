//! HTTP surface.
//!
//! Server-rendered pages live in `pages`, JSON endpoints in `api`. Both
//! share [`AppState`] and the cookie sessions from [`session`].

mod api;
mod pages;
pub mod session;
pub mod views;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use chrono::{FixedOffset, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::avatar::AvatarStore;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::password;
use crate::seed::ensure_admin_account;
use crate::storage::Storage;
use session::SessionStore;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The database.
    pub storage: Arc<Mutex<Storage>>,
    /// Live sessions.
    pub sessions: SessionStore,
    /// Avatar files.
    pub avatars: AvatarStore,
    /// Loaded configuration.
    pub config: Arc<Config>,
}

impl AppState {
    /// Assemble the state from an open database and configuration.
    #[must_use]
    pub fn new(storage: Storage, config: Config) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            sessions: SessionStore::new(config.session_ttl()),
            avatars: AvatarStore::new(config.avatar_dir(), &config.uploads.allowed_extensions),
            config: Arc::new(config),
        }
    }

    /// Offset defining the local calendar day.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.config.local_offset()
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// An error raised while rendering an HTML page.
#[derive(Debug)]
pub struct PageError(pub Error);

impl From<Error> for PageError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        let message = if status.is_server_error() {
            error!(error = %self.0, "Page failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };
        (status, views::error_page(&message)).into_response()
    }
}

/// Successful JSON answer.
pub(crate) fn ok(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "success": true, "message": message.into() }))
}

/// Hash a password off the async workers.
pub(crate) async fn hash_blocking(password: String, iterations: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || password::hash_password(&password, iterations))
        .await
        .map_err(|e| Error::internal(format!("password hashing task failed: {e}")))
}

/// Verify a password off the async workers.
pub(crate) async fn verify_blocking(stored: String, candidate: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || password::verify_password(&stored, &candidate))
        .await
        .map_err(|e| Error::internal(format!("password check task failed: {e}")))
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;
    let avatars = ServeDir::new(state.avatars.dir());

    Router::new()
        // Pages
        .route("/", get(pages::dashboard))
        .route("/login", get(pages::login_form).post(pages::login))
        .route("/logout", get(pages::logout))
        .route("/register", get(pages::register_form).post(pages::register))
        .route("/profile", get(pages::profile))
        .route(
            "/profile/edit",
            get(pages::edit_profile_form).post(pages::edit_profile),
        )
        .route("/user/{id}", get(pages::member_profile))
        .route("/events", get(pages::events))
        .route("/event/{id}", get(pages::event_detail))
        .route("/admin", get(pages::admin))
        // Attendance
        .route("/checkin", post(api::check_in))
        .route("/checkout", post(api::check_out))
        .route("/event/{id}/checkin", post(api::event_check_in))
        .route("/event/{id}/register", post(api::register))
        .route("/event/{id}/cancel", post(api::cancel))
        // Administration
        .route("/admin/users", get(api::list_users))
        .route("/admin/users/{id}", get(api::user_detail))
        .route("/admin/users/add", post(api::add_user))
        .route("/admin/users/edit/{id}", post(api::edit_user))
        .route("/admin/users/delete/{id}", post(api::delete_user))
        .route("/admin/checkins", get(api::list_check_ins))
        .route("/admin/events/add", post(api::add_event))
        .route("/admin/events/edit/{id}", post(api::edit_event))
        .route("/admin/events/delete/{id}", post(api::delete_event))
        .route("/admin/events/fix_organizers", post(api::fix_organizers))
        // Avatars
        .route("/upload_avatar", post(api::upload_avatar))
        .route("/api/user/{id}/avatar", get(api::user_avatar))
        // Diagnostics
        .route("/health", get(api::health))
        .route("/ping", get(api::ping))
        .route("/info", get(api::info))
        .nest_service("/static/avatars", avatars)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, views::error_page("page not found"))
}

/// Open the database, seed the administrator and serve until shutdown.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the avatar directory
/// cannot be created or the address cannot be bound.
pub async fn serve(config: Config) -> Result<()> {
    let storage = Storage::open(config.database_path())?;
    ensure_admin_account(&storage, &config.auth, Utc::now())?;

    let address = config.bind_address();
    let state = AppState::new(storage, config);
    state.avatars.ensure_dir()?;

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, "rollcall listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
    use axum::http::{Method, Request};
    use tower::ServiceExt;

    use crate::models::{NewUser, PermissionFlags};
    use crate::password::hash_password;
    use crate::storage::test_support::draft;

    const ITERATIONS: u32 = 1000;

    struct TestApp {
        state: AppState,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            crate::logging::init_test_logging();
            let dir = tempfile::tempdir().unwrap();
            let mut config = Config::default();
            config.auth.password_iterations = ITERATIONS;
            config.uploads.avatar_dir = Some(dir.path().join("avatars"));

            let storage = Storage::open_in_memory().unwrap();
            ensure_admin_account(&storage, &config.auth, Utc::now()).unwrap();
            Self {
                state: AppState::new(storage, config),
                _dir: dir,
            }
        }

        fn add_member(&self, username: &str, password: &str) -> i64 {
            self.add_member_with(username, password, PermissionFlags::default())
        }

        fn add_member_with(
            &self,
            username: &str,
            password: &str,
            permissions: PermissionFlags,
        ) -> i64 {
            self.state
                .storage
                .lock()
                .create_user(
                    &NewUser {
                        username: username.to_string(),
                        password_hash: hash_password(password, ITERATIONS),
                        name: username.to_uppercase(),
                        permissions,
                        ..NewUser::default()
                    },
                    Utc::now(),
                )
                .unwrap()
        }

        fn user_id(&self, username: &str) -> i64 {
            self.state
                .storage
                .lock()
                .get_user_by_username(username)
                .unwrap()
                .unwrap()
                .id
        }

        fn add_event(&self, organizer: i64, max_participants: u32) -> i64 {
            let mut draft = draft(organizer, Utc::now() + chrono::Duration::days(1));
            draft.max_participants = max_participants;
            self.state
                .storage
                .lock()
                .create_event(&draft, Utc::now())
                .unwrap()
        }

        async fn send(&self, request: Request<Body>) -> Response {
            router(self.state.clone()).oneshot(request).await.unwrap()
        }

        /// Log in and return the session cookie.
        async fn login(&self, username: &str, password: &str) -> String {
            let response = self
                .send(form(
                    Method::POST,
                    "/login",
                    None,
                    &format!("username={username}&password={password}"),
                ))
                .await;
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            session_cookie(&response)
        }
    }

    fn session_cookie(response: &Response) -> String {
        let header = response
            .headers()
            .get(SET_COOKIE)
            .expect("session cookie")
            .to_str()
            .unwrap();
        header.split(';').next().unwrap().to_string()
    }

    fn form(method: Method, uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn avatar_upload(cookie: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "rollcall-avatar-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"avatar\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/upload_avatar")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header(COOKIE, cookie)
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ping() {
        let app = TestApp::new();

        let response = app.send(get_request("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "rollcall");

        let json = body_json(app.send(get_request("/ping", None)).await).await;
        assert_eq!(json["message"], "pong");
    }

    #[tokio::test]
    async fn test_pages_redirect_to_login() {
        let app = TestApp::new();

        let response = app.send(get_request("/", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_json_endpoints_require_login() {
        let app = TestApp::new();

        let response = app.send(form(Method::POST, "/checkin", None, "")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "please log in first");
    }

    #[tokio::test]
    async fn test_bad_login_rerenders_with_flash() {
        let app = TestApp::new();

        let response = app
            .send(form(
                Method::POST,
                "/login",
                None,
                "username=admin&password=wrong",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response)
            .await
            .contains("invalid username or password"));
    }

    #[tokio::test]
    async fn test_check_in_flow() {
        let app = TestApp::new();
        app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;

        let response = app
            .send(form(Method::POST, "/checkin", Some(&cookie), "location=Hall&notes="))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);

        let response = app
            .send(form(Method::POST, "/checkin", Some(&cookie), ""))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["message"], "already checked in today");

        let response = app
            .send(form(Method::POST, "/checkout", Some(&cookie), ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(get_request("/", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Welcome, AMY"));
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let app = TestApp::new();

        let response = app
            .send(form(
                Method::POST,
                "/register",
                None,
                "username=bob&password=secret&name=Bob&position=%E4%B8%BB%E5%B8%AD",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");

        let response = app
            .send(form(
                Method::POST,
                "/register",
                None,
                "username=bob&password=other&name=Bob",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("username already exists"));

        app.login("bob", "secret").await;
    }

    #[tokio::test]
    async fn test_admin_page_denied_for_members() {
        let app = TestApp::new();
        app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;

        let response = app.send(get_request("/admin", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/");

        let response = app.send(get_request("/admin/users", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_manages_events_and_users() {
        let app = TestApp::new();
        let amy = app.add_member("amy", "pw");
        let cookie = app.login("admin", "admin123").await;

        let response = app
            .send(form(
                Method::POST,
                "/admin/events/add",
                Some(&cookie),
                "title=Gala&description=&location=Hall&start_time=2030-05-01T18:00\
                 &end_time=2030-05-01T21:00&max_participants=1&organizer_id=",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let event_id = body_json(response).await["event_id"].as_i64().unwrap();

        let response = app
            .send(get_request(&format!("/event/{event_id}"), Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Gala"));

        let response = app
            .send(form(
                Method::POST,
                &format!("/event/{event_id}/checkin"),
                Some(&cookie),
                &format!("checkin_user={amy}"),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(get_request(&format!("/admin/users/{amy}"), Some(&cookie)))
            .await;
        let json = body_json(response).await;
        assert_eq!(json["user"]["username"], "amy");
        assert_eq!(json["user"]["can_add_events"], false);
        assert!(json["user"].get("password_hash").is_none());

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/delete/{amy}"),
                Some(&cookie),
                "",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.state.storage.lock().count_check_ins().unwrap(), 0);

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/events/delete/{event_id}"),
                Some(&cookie),
                "",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.state.storage.lock().count_events().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admin_cannot_delete_self() {
        let app = TestApp::new();
        let cookie = app.login("admin", "admin123").await;
        let admin_id = app
            .state
            .storage
            .lock()
            .get_user_by_username("admin")
            .unwrap()
            .unwrap()
            .id;

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/delete/{admin_id}"),
                Some(&cookie),
                "",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["message"],
            "cannot delete your own account"
        );
    }

    #[tokio::test]
    async fn test_unknown_event_redirects_to_events() {
        let app = TestApp::new();
        let cookie = app.login("admin", "admin123").await;

        let response = app.send(get_request("/event/999", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/events");
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let app = TestApp::new();
        app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;

        let response = app.send(get_request("/logout", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = app.send(get_request("/profile", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let app = TestApp::new();
        let response = app.send(get_request("/nowhere", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cookieless_requests_store_no_session() {
        let app = TestApp::new();

        for _ in 0..50 {
            let response = app.send(get_request("/health", None)).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(SET_COOKIE).is_none());
        }
        let response = app.send(get_request("/login", None)).await;
        assert!(response.headers().get(SET_COOKIE).is_none());

        assert!(app.state.sessions.is_empty());
    }

    #[tokio::test]
    async fn test_login_issues_fresh_session_id() {
        let app = TestApp::new();
        app.add_member("amy", "pw");

        let response = app.send(get_request("/", None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let before = session_cookie(&response);

        let response = app
            .send(form(
                Method::POST,
                "/login",
                Some(&before),
                "username=amy&password=pw",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let after = session_cookie(&response);
        assert_ne!(before, after);

        let response = app.send(get_request("/profile", Some(&before))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");

        let response = app.send(get_request("/profile", Some(&after))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_deleted_member_session_is_cleared() {
        let app = TestApp::new();
        let amy = app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;

        app.state.storage.lock().delete_user(amy).unwrap();

        let response = app.send(get_request("/profile", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");

        let response = app
            .send(form(Method::POST, "/checkin", Some(&cookie), ""))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_user_manager_cannot_touch_admin_account() {
        let app = TestApp::new();
        let admin_id = app.user_id("admin");
        app.add_member_with(
            "mod",
            "pw",
            PermissionFlags {
                manage_users: true,
                ..PermissionFlags::default()
            },
        );
        let cookie = app.login("mod", "pw").await;

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/edit/{admin_id}"),
                Some(&cookie),
                "name=Administrator&is_admin=on&password=taken",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(form(
                Method::POST,
                "/login",
                None,
                "username=admin&password=taken",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        app.login("admin", "admin123").await;

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/delete/{admin_id}"),
                Some(&cookie),
                "",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(app.state.storage.lock().get_user(admin_id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_manager_edits_members() {
        let app = TestApp::new();
        let amy = app.add_member("amy", "pw");
        app.add_member_with(
            "mod",
            "pw",
            PermissionFlags {
                manage_users: true,
                ..PermissionFlags::default()
            },
        );
        let cookie = app.login("mod", "pw").await;

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/edit/{amy}"),
                Some(&cookie),
                "name=Amy+Lee&position=%E4%B8%BB%E5%B8%AD&can_add_events=on&password=fresh",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let stored = app.state.storage.lock().get_user(amy).unwrap().unwrap();
        assert_eq!(stored.name, "Amy Lee");
        assert_eq!(stored.position.as_deref(), Some("主席"));
        assert!(stored.permissions.add_events);
        assert!(!stored.permissions.manage_users);
        assert!(!stored.is_admin);
        app.login("amy", "fresh").await;

        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/users/edit/{amy}"),
                Some(&cookie),
                "name=Amy&is_admin=on",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(form(
                Method::POST,
                "/admin/users/edit/999",
                Some(&cookie),
                "name=Nobody",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_user_admin_flag_needs_admin() {
        let app = TestApp::new();
        app.add_member_with(
            "mod",
            "pw",
            PermissionFlags {
                manage_users: true,
                ..PermissionFlags::default()
            },
        );
        let moderator = app.login("mod", "pw").await;

        let response = app
            .send(form(
                Method::POST,
                "/admin/users/add",
                Some(&moderator),
                "username=cy&password=pw&name=Cy&is_admin=on",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .send(form(
                Method::POST,
                "/admin/users/add",
                Some(&moderator),
                "username=cy&password=&name=Cy",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .send(form(
                Method::POST,
                "/admin/users/add",
                Some(&moderator),
                "username=cy&password=pw&name=Cy&can_edit_events=on&bio=hello",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cy = body_json(response).await["user_id"].as_i64().unwrap();
        let stored = app.state.storage.lock().get_user(cy).unwrap().unwrap();
        assert!(stored.permissions.edit_events);
        assert!(!stored.is_admin);
        assert_eq!(stored.bio.as_deref(), Some("hello"));
        app.login("cy", "pw").await;

        let response = app
            .send(form(
                Method::POST,
                "/admin/users/add",
                Some(&moderator),
                "username=cy&password=pw&name=Cy",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let admin = app.login("admin", "admin123").await;
        let response = app
            .send(form(
                Method::POST,
                "/admin/users/add",
                Some(&admin),
                "username=dee&password=pw&name=Dee&is_admin=on",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let dee = app.user_id("dee");
        assert!(app.state.storage.lock().get_user(dee).unwrap().unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_register_and_cancel() {
        let app = TestApp::new();
        let event = app.add_event(app.user_id("admin"), 1);
        app.add_member("amy", "pw");
        app.add_member("bob", "pw");
        let amy = app.login("amy", "pw").await;
        let bob = app.login("bob", "pw").await;
        let register = format!("/event/{event}/register");
        let cancel = format!("/event/{event}/cancel");

        let response = app.send(form(Method::POST, &register, Some(&amy), "")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.send(form(Method::POST, &register, Some(&amy), "")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await["message"],
            "already registered for this event"
        );

        let response = app.send(form(Method::POST, &register, Some(&bob), "")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await["message"],
            "event is full (1 participants)"
        );

        let response = app.send(form(Method::POST, &cancel, Some(&amy), "")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.send(form(Method::POST, &cancel, Some(&amy), "")).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = app.send(form(Method::POST, &register, Some(&bob), "")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(form(Method::POST, "/event/999/register", Some(&bob), ""))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_event_edit_by_flag_or_organizer() {
        let app = TestApp::new();
        let admin_id = app.user_id("admin");
        let event = app.add_event(admin_id, 0);
        app.add_member_with(
            "ed",
            "pw",
            PermissionFlags {
                edit_events: true,
                ..PermissionFlags::default()
            },
        );
        let olga = app.add_member("olga", "pw");
        let own_event = app.add_event(olga, 0);
        app.add_member("amy", "pw");
        let body = format!(
            "title=Renamed&description=&location=Annex&start_time=2030-05-01T18:00\
             &end_time=2030-05-01T21:00&max_participants=&organizer_id={admin_id}"
        );
        let uri = format!("/admin/events/edit/{event}");

        let amy = app.login("amy", "pw").await;
        let response = app.send(form(Method::POST, &uri, Some(&amy), &body)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let ed = app.login("ed", "pw").await;
        let response = app.send(form(Method::POST, &uri, Some(&ed), &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let stored = app.state.storage.lock().get_event(event).unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.location, "Annex");
        assert_eq!(stored.organizer_id, Some(admin_id));

        let olga_cookie = app.login("olga", "pw").await;
        let response = app
            .send(form(
                Method::POST,
                &format!("/admin/events/edit/{own_event}"),
                Some(&olga_cookie),
                "title=Mine&location=Den&start_time=2030-06-01T10:00&end_time=2030-06-01T11:00",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let stored = app.state.storage.lock().get_event(own_event).unwrap().unwrap();
        assert_eq!(stored.title, "Mine");
        assert_eq!(stored.organizer_id, Some(olga));
    }

    #[tokio::test]
    async fn test_fix_organizers_and_info() {
        let app = TestApp::new();
        let admin_id = app.user_id("admin");
        let amy = app.add_member("amy", "pw");
        let event = app.add_event(amy, 0);
        app.state.storage.lock().delete_user(amy).unwrap();
        app.add_member("bob", "pw");

        let bob = app.login("bob", "pw").await;
        let response = app
            .send(form(Method::POST, "/admin/events/fix_organizers", Some(&bob), ""))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let admin = app.login("admin", "admin123").await;
        let response = app
            .send(form(Method::POST, "/admin/events/fix_organizers", Some(&admin), ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["fixed"], 1);
        let stored = app.state.storage.lock().get_event(event).unwrap().unwrap();
        assert_eq!(stored.organizer_id, Some(admin_id));

        let json = body_json(app.send(get_request("/info", None)).await).await;
        assert_eq!(json["app_name"], "rollcall");
        assert_eq!(json["database"], "SQLite");
    }

    #[tokio::test]
    async fn test_avatar_upload_and_lookup() {
        let app = TestApp::new();
        let amy = app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;
        let dir = app.state.avatars.dir().to_path_buf();

        let response = app.send(avatar_upload(&cookie, "me.png", b"first")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let first = body_json(response).await["avatar"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(first.starts_with(&format!("{amy}_")));
        assert!(first.ends_with("_me.png"));
        assert_eq!(std::fs::read(dir.join(&first)).unwrap(), b"first");

        let response = app.send(avatar_upload(&cookie, "run.exe", b"nope")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "unsupported file type: run.exe"
        );

        let response = app.send(avatar_upload(&cookie, "new.JPG", b"second")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let second = body_json(response).await["avatar"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(dir.join(&second).exists());
        assert!(!dir.join(&first).exists());

        let response = app
            .send(get_request(&format!("/api/user/{amy}/avatar"), Some(&cookie)))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["avatar"], second.as_str());
        assert_eq!(json["name"], "AMY");

        let response = app
            .send(get_request(&format!("/static/avatars/{second}"), None))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "second");

        let response = app
            .send(get_request(&format!("/api/user/{amy}/avatar"), None))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_avatar_upload_without_file() {
        let app = TestApp::new();
        app.add_member("amy", "pw");
        let cookie = app.login("amy", "pw").await;

        let response = app.send(avatar_upload(&cookie, "", b"")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "no file selected");
    }
}
