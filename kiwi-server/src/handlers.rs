//! HTTP handlers
//!
//! Every handler ends in a rendered page or a redirect. Status for the next
//! page travels through flash messages on the transport session.

use axum::{
    extract::{rejection::FormRejection, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Extension, Form, Json,
};

use kiwi_core::session::SESSION_TOKEN_KEY;
use kiwi_core::{Device, DeviceCommand, RequestContext, SignInForm};

use crate::state::SharedState;
use crate::view::HomeView;

pub const HOME: &str = "/";

/// Flash shown after signing out
pub const GOODBYE: &str = "Goodbye!";

/// 302 Found
fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn internal_error(e: impl std::fmt::Display) -> Response {
    tracing::error!("Request failed: {}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "500: Internal server error").into_response()
}

/// Queue an error flash, logging if there is no session to hold it
fn flash_error(ctx: &RequestContext, message: impl Into<String>) {
    if let Err(e) = ctx.push_error(message) {
        tracing::error!("Failed to queue error flash: {}", e);
    }
}

fn flash_notification(ctx: &RequestContext, message: impl Into<String>) {
    if let Err(e) = ctx.push_notification(message) {
        tracing::error!("Failed to queue notification flash: {}", e);
    }
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "kiwi-server"
    }))
}

/// GET /
pub async fn home(State(state): State<SharedState>, Extension(ctx): Extension<RequestContext>) -> Response {
    let remembered_username = ctx
        .session()
        .ok()
        .and_then(|s| s.take_rejected_form())
        .map(|form| form.username);

    let view = HomeView {
        username: &ctx.username,
        error_messages: &ctx.error_messages,
        notification_messages: &ctx.notification_messages,
        remembered_username,
    };

    match state.view.render_home(&view) {
        Ok(html) => Html(html).into_response(),
        Err(e) => internal_error(e),
    }
}

/// POST /signin
pub async fn sign_in(Extension(ctx): Extension<RequestContext>, form: Result<Form<SignInForm>, FormRejection>) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::warn!("Sign-in form rejected: {}", rejection.body_text());
            flash_error(&ctx, format!("Decoding error: {}", rejection.body_text()));
            return Redirect::to(HOME).into_response();
        }
    };

    let (storage, session) = match (ctx.storage(), ctx.session()) {
        (Ok(storage), Ok(session)) => (storage.clone(), session.clone()),
        (Err(e), _) | (_, Err(e)) => return internal_error(e),
    };

    // Argon2 verification blocks; keep it off the async workers
    let (username, password, remember) = (form.username.clone(), form.password.clone(), form.remember);
    let attempt = tokio::task::spawn_blocking(move || storage.attempt_login(&username, &password, remember)).await;

    match attempt {
        Ok(Ok(token)) => {
            session.set(SESSION_TOKEN_KEY, token);
            found(HOME)
        }
        Ok(Err(e)) => {
            if let Err(e) = ctx.push_rejected_form(&form) {
                tracing::error!("Failed to queue rejected form: {}", e);
            }
            flash_error(&ctx, e.to_string());
            Redirect::to(HOME).into_response()
        }
        Err(e) => {
            tracing::error!("Login task failed: {}", e);
            flash_error(&ctx, "Logging in failed (unspecified error).");
            Redirect::to(HOME).into_response()
        }
    }
}

/// GET /signout
pub async fn sign_out(Extension(ctx): Extension<RequestContext>) -> Response {
    let (storage, session) = match (ctx.storage(), ctx.session()) {
        (Ok(storage), Ok(session)) => (storage.clone(), session.clone()),
        (Err(e), _) | (_, Err(e)) => return internal_error(e),
    };

    session.remove(SESSION_TOKEN_KEY);
    flash_notification(&ctx, GOODBYE);

    let username = ctx.username.clone();
    match tokio::task::spawn_blocking(move || storage.logout(&username)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Logout of '{}' failed: {}", ctx.username, e),
        Err(e) => tracing::error!("Logout task failed: {}", e),
    }

    found(HOME)
}

/// GET /tv/{command}
pub async fn tv_command(
    State(state): State<SharedState>,
    Extension(ctx): Extension<RequestContext>,
    Path(command): Path<String>,
) -> Response {
    run_device_command(&state, &ctx, Device::Tv, &command).await
}

/// GET /toshiba/{command}
pub async fn toshiba_command(
    State(state): State<SharedState>,
    Extension(ctx): Extension<RequestContext>,
    Path(command): Path<String>,
) -> Response {
    run_device_command(&state, &ctx, Device::Toshiba, &command).await
}

/// Output always becomes a notification; a failure adds an error as well
async fn run_device_command(state: &SharedState, ctx: &RequestContext, device: Device, name: &str) -> Response {
    let command = match DeviceCommand::parse(device, name) {
        Ok(command) => command,
        Err(e) => {
            tracing::warn!("Rejected command from '{}': {}", ctx.username, e);
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    };

    let (output, failure) = match state.executor.execute(command).await {
        Ok(output) => (output, None),
        Err(e) => (e.output().to_string(), Some(e.to_string())),
    };

    flash_notification(ctx, output);
    if let Some(failure) = failure {
        flash_error(ctx, failure);
    }

    found(HOME)
}
