//! Router assembly

use std::path::Path;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::handlers;
use crate::pipeline;
use crate::state::SharedState;

/// Build the application router.
///
/// Layers only wrap routes added before them: the pipeline covers the page
/// routes, while `/health` and the static assets under `public_prefix` are
/// added afterwards and bypass it.
pub fn router(state: SharedState, public_prefix: &str, public_dir: &Path) -> Router {
    let protected = Router::new()
        .route("/signout", get(handlers::sign_out))
        .route("/tv/{command}", get(handlers::tv_command))
        .route("/toshiba/{command}", get(handlers::toshiba_command))
        .route_layer(middleware::from_fn(pipeline::require_account));

    Router::new()
        .route(handlers::HOME, get(handlers::home))
        .route("/signin", post(handlers::sign_in))
        .merge(protected)
        .layer(middleware::from_fn_with_state(state.clone(), pipeline::run_pipeline))
        .route("/health", get(handlers::health))
        .nest_service(public_prefix, ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, Response, StatusCode};
    use tower::ServiceExt;

    use kiwi_core::users::hash_password_with_cost;
    use kiwi_core::{
        CommandExecutor, DeviceCommand, ExecutorError, SessionCodec, UserRecord, UserStorage, UserStore,
    };

    use crate::handlers::GOODBYE;
    use crate::pipeline::SIGN_IN_REQUIRED;
    use crate::state::AppState;
    use crate::view::HtmlView;

    /// Commands seen by the fake executor
    #[derive(Clone, Default)]
    struct Calls(Arc<Mutex<Vec<DeviceCommand>>>);

    impl Calls {
        fn record(&self, command: DeviceCommand) {
            self.0.lock().unwrap().push(command);
        }

        fn take(&self) -> Vec<DeviceCommand> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    struct FakeExecutor {
        calls: Calls,
        fail: bool,
    }

    #[async_trait]
    impl CommandExecutor for FakeExecutor {
        async fn execute(&self, command: DeviceCommand) -> Result<String, ExecutorError> {
            self.calls.record(command);
            if self.fail {
                Err(ExecutorError::CommandFailed {
                    command: command.name(),
                    output: "opening a connection to the CEC adapter...".to_string(),
                    reason: "exit status: 1".to_string(),
                })
            } else {
                Ok(format!("ran {}", command.name()))
            }
        }
    }

    struct TestApp {
        router: Router,
        store: Arc<UserStore>,
        calls: Calls,
        cookie: Option<String>,
        _public: tempfile::TempDir,
    }

    impl TestApp {
        fn new(fail: bool) -> Self {
            let public = tempfile::tempdir().unwrap();
            std::fs::write(public.path().join("style.css"), "body { color: green; }").unwrap();

            let users = UserStore::in_memory(vec![UserRecord::new(
                "alice",
                hash_password_with_cost("hunter2", 8, 1).unwrap(),
            )]);
            let calls = Calls::default();
            let executor = Arc::new(FakeExecutor {
                calls: calls.clone(),
                fail,
            });

            let state = Arc::new(AppState::new(
                users,
                SessionCodec::new(b"router-test-secret-router-test-secret", 3600),
                executor,
                Arc::new(HtmlView::new("/public")),
                Duration::from_secs(3600),
                Duration::from_secs(300),
            ));
            let store = state.users.clone();

            Self {
                router: router(state, "/public", public.path()),
                store,
                calls,
                cookie: None,
                _public: public,
            }
        }

        /// Send a request carrying the current cookie and keep any new one
        async fn send(&mut self, request: Request<Body>) -> Response<Body> {
            let mut request = request;
            if let Some(cookie) = &self.cookie {
                request
                    .headers_mut()
                    .insert(header::COOKIE, cookie.parse().unwrap());
            }

            let response = self.router.clone().oneshot(request).await.unwrap();

            if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
                let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
                self.cookie = Some(pair.to_string());
            }
            response
        }

        async fn get(&mut self, uri: &str) -> Response<Body> {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn sign_in(&mut self, body: &str) -> Response<Body> {
            self.send(
                Request::post("/signin")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
        }

        async fn home_page(&mut self) -> String {
            let response = self.get("/").await;
            assert_eq!(response.status(), StatusCode::OK);
            body_text(response).await
        }
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response<Body>) -> &str {
        response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_anonymous_protected_route_redirects_home() {
        let mut app = TestApp::new(false);

        let response = app.get("/tv/poweron").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(app.cookie.is_some());
        assert!(app.calls.take().is_empty());

        let page = app.home_page().await;
        assert!(page.contains(SIGN_IN_REQUIRED));

        // Shown exactly once
        let page = app.home_page().await;
        assert!(!page.contains(SIGN_IN_REQUIRED));
    }

    #[tokio::test]
    async fn test_sign_in_then_run_command() {
        let mut app = TestApp::new(false);

        let response = app.sign_in("Username=alice&Password=hunter2&Remember=on").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(location(&response), "/");

        let page = app.home_page().await;
        assert!(page.contains("Signed in as <b>alice</b>"));

        let response = app.get("/tv/poweron").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.calls.take(), vec![DeviceCommand::PowerOn]);

        let page = app.home_page().await;
        assert!(page.contains("ran poweron"));

        let response = app.get("/toshiba/wol").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(app.calls.take(), vec![DeviceCommand::WakeOnLan]);
    }

    #[tokio::test]
    async fn test_remember_sets_long_expiry() {
        let mut app = TestApp::new(false);
        app.sign_in("Username=alice&Password=hunter2&Remember=true").await;

        let expiry = app.store.load_user("alice").unwrap().session_expiry;
        assert!(expiry > chrono::Utc::now() + chrono::Duration::days(27));
    }

    #[tokio::test]
    async fn test_unknown_command_is_bad_request() {
        let mut app = TestApp::new(false);
        app.sign_in("Username=alice&Password=hunter2").await;

        let response = app.get("/tv/not-a-command").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "400: Bad tv command: not-a-command");

        let response = app.get("/toshiba/poweron").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.calls.take().is_empty());
    }

    #[tokio::test]
    async fn test_failed_command_flashes_output_and_error() {
        let mut app = TestApp::new(true);
        app.sign_in("Username=alice&Password=hunter2").await;

        app.get("/tv/hdmi2").await;
        let page = app.home_page().await;

        assert!(page.contains("opening a connection to the CEC adapter..."));
        assert!(page.contains("hdmi2 failed: exit status: 1"));
    }

    #[tokio::test]
    async fn test_bad_credentials_flash_generic_error() {
        let mut app = TestApp::new(false);

        let response = app.sign_in("Username=alice&Password=wrong").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let wrong_password = app.home_page().await;

        app.sign_in("Username=mallory&Password=hunter2").await;
        let unknown_user = app.home_page().await;

        for page in [&wrong_password, &unknown_user] {
            assert!(page.contains("Invalid Username or Password"));
            assert!(page.contains("action=\"/signin\""));
        }
        // Rejected username is offered back, the password never is
        assert!(wrong_password.contains("value=\"alice\""));
        assert!(!wrong_password.contains("wrong"));
        assert!(unknown_user.contains("value=\"mallory\""));
    }

    #[tokio::test]
    async fn test_undecodable_form_redirects_with_error() {
        let mut app = TestApp::new(false);

        let response = app
            .send(Request::post("/signin").body(Body::from("Username=alice")).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let page = app.home_page().await;
        assert!(page.contains("Decoding error"));
        assert!(app.store.load_user("alice").unwrap().session_token.is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_invalidates_session() {
        let mut app = TestApp::new(false);
        app.sign_in("Username=alice&Password=hunter2").await;
        let token = app.store.load_user("alice").unwrap().session_token;

        let response = app.get("/signout").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert!(app.store.load_username_from_session_token(&token).is_err());

        let page = app.home_page().await;
        assert!(page.contains(GOODBYE));
        assert!(!page.contains("Signed in as"));

        let response = app.get("/tv/poweron").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(app.calls.take().is_empty());
    }

    #[tokio::test]
    async fn test_session_cookie_from_another_browser_is_isolated() {
        let mut alice = TestApp::new(false);
        alice.sign_in("Username=alice&Password=wrong").await;

        // A second client on the same server never sees alice's flashes
        let mut other = TestApp {
            router: alice.router.clone(),
            store: alice.store.clone(),
            calls: alice.calls.clone(),
            cookie: None,
            _public: tempfile::tempdir().unwrap(),
        };
        let page = other.home_page().await;
        assert!(!page.contains("Invalid Username or Password"));

        let page = alice.home_page().await;
        assert!(page.contains("Invalid Username or Password"));
    }

    #[tokio::test]
    async fn test_static_assets_bypass_pipeline() {
        let mut app = TestApp::new(false);

        let response = app.get("/public/style.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(body_text(response).await, "body { color: green; }");
    }

    #[tokio::test]
    async fn test_health() {
        let mut app = TestApp::new(false);
        let response = app.get("/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("\"status\":\"ok\""));
    }
}
