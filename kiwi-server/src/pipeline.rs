//! Request pipeline
//!
//! Global stages run in a fixed order before routing, each taking the
//! request head and the context built so far:
//!
//! 1. `BindStorage`       - attach the credential store
//! 2. `BindSession`       - restore or start the transport session
//! 3. `ResolveIdentity`   - session token -> username (never aborts)
//! 4. `DrainFlash` errors
//! 5. `DrainFlash` notifications
//!
//! Any stage may answer the request itself, which skips the rest. Static
//! assets are served by the router before this pipeline, and the
//! authorization gate runs after routing on protected routes only.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use kiwi_core::session::{SESSION_COOKIE, SESSION_TOKEN_KEY};
use kiwi_core::{Channel, FlashQueue, RequestContext, SessionCodec, TransportSession, UserStorage};

use crate::handlers::HOME;
use crate::state::SharedState;

/// Flash shown after an anonymous request hits a protected route
pub const SIGN_IN_REQUIRED: &str = "You need to sign in to view this page!";

/// Outcome of a stage
pub enum Flow {
    Continue(RequestContext),
    Respond(Response),
}

pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn run(&self, parts: &Parts, ctx: RequestContext) -> Flow;
}

/// Ordered list of stages
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// The global stages every request goes through
    pub fn standard(storage: Arc<dyn UserStorage>, codec: Arc<SessionCodec>, flashes: Arc<FlashQueue>) -> Self {
        Self::new()
            .stage(BindStorage(storage))
            .stage(BindSession { codec, flashes })
            .stage(ResolveIdentity)
            .stage(DrainFlash::errors())
            .stage(DrainFlash::notifications())
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn run(&self, parts: &Parts) -> Flow {
        let mut ctx = RequestContext::new();
        for stage in &self.stages {
            match stage.run(parts, ctx) {
                Flow::Continue(next) => ctx = next,
                Flow::Respond(response) => {
                    tracing::debug!("Pipeline stopped at {}", stage.name());
                    return Flow::Respond(response);
                }
            }
        }
        Flow::Continue(ctx)
    }
}

pub struct BindStorage(pub Arc<dyn UserStorage>);

impl Stage for BindStorage {
    fn name(&self) -> &'static str {
        "bind-storage"
    }

    fn run(&self, _parts: &Parts, mut ctx: RequestContext) -> Flow {
        ctx.bind_storage(self.0.clone());
        Flow::Continue(ctx)
    }
}

pub struct BindSession {
    pub codec: Arc<SessionCodec>,
    pub flashes: Arc<FlashQueue>,
}

impl Stage for BindSession {
    fn name(&self) -> &'static str {
        "bind-session"
    }

    fn run(&self, parts: &Parts, mut ctx: RequestContext) -> Flow {
        let jar = CookieJar::from_headers(&parts.headers);
        let cookie = jar.get(SESSION_COOKIE).map(|c| c.value());

        match self.codec.open(cookie, self.flashes.clone()) {
            Ok(session) => {
                ctx.bind_session(session);
                Flow::Continue(ctx)
            }
            Err(e) => {
                tracing::error!("Failed to open transport session: {}", e);
                Flow::Respond(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

pub struct ResolveIdentity;

impl Stage for ResolveIdentity {
    fn name(&self) -> &'static str {
        "resolve-identity"
    }

    fn run(&self, _parts: &Parts, mut ctx: RequestContext) -> Flow {
        let token = ctx.session().ok().and_then(|s| s.get(SESSION_TOKEN_KEY));
        let storage = ctx.storage().ok().cloned();

        if let (Some(token), Some(storage)) = (token, storage) {
            match storage.load_username_from_session_token(&token) {
                Ok(username) => ctx.username = username,
                Err(e) => tracing::debug!("Session token not accepted: {}", e),
            }
        }
        Flow::Continue(ctx)
    }
}

pub struct DrainFlash {
    channel: Channel,
}

impl DrainFlash {
    pub fn errors() -> Self {
        Self { channel: Channel::Errors }
    }

    pub fn notifications() -> Self {
        Self {
            channel: Channel::Notifications,
        }
    }
}

impl Stage for DrainFlash {
    fn name(&self) -> &'static str {
        self.channel.name()
    }

    fn run(&self, _parts: &Parts, mut ctx: RequestContext) -> Flow {
        let Some(session) = ctx.session().ok().cloned() else {
            return Flow::Continue(ctx);
        };

        let messages = session.drain_messages(self.channel);
        match self.channel {
            Channel::Errors => ctx.error_messages = messages,
            Channel::Notifications => ctx.notification_messages = messages,
            Channel::RejectedForm => {}
        }
        Flow::Continue(ctx)
    }
}

/// Middleware running the global pipeline and saving the transport session
pub async fn run_pipeline(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let ctx = match state.pipeline.run(&parts) {
        Flow::Continue(ctx) => ctx,
        Flow::Respond(response) => return response,
    };

    let session = ctx.session().ok().cloned();
    parts.extensions.insert(ctx);

    let response = next.run(Request::from_parts(parts, body)).await;

    match session.and_then(|session| session_cookie(&state.codec, &session)) {
        Some(cookie) => (CookieJar::new().add(cookie), response).into_response(),
        None => response,
    }
}

/// The `Set-Cookie` to send, if the handler left the session changed
fn session_cookie(codec: &SessionCodec, session: &TransportSession) -> Option<Cookie<'static>> {
    if !session.needs_save() {
        return None;
    }

    let value = match codec.encode(session) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to encode transport session: {}", e);
            return None;
        }
    };

    let max_age = i64::try_from(codec.max_age_secs()).unwrap_or(i64::MAX);
    Some(
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age))
            .build(),
    )
}

/// Authorization gate for protected routes
pub async fn require_account(Extension(ctx): Extension<RequestContext>, request: Request, next: Next) -> Response {
    if ctx.is_signed_in() {
        return next.run(request).await;
    }

    if let Err(e) = ctx.push_error(SIGN_IN_REQUIRED) {
        tracing::error!("Failed to queue sign-in flash: {}", e);
    }
    Redirect::to(HOME).into_response()
}
