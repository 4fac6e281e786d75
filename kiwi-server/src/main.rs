//! kiwi-server: home control panel
//!
//! A small web panel on the living-room Pi:
//! - Users sign in against a JSON user file (created on first run)
//! - Signed-in users switch the TV over HDMI-CEC
//! - The laptop is woken with Wake-on-LAN

mod executor;
mod handlers;
mod housekeeping;
mod pipeline;
mod routes;
mod state;
mod view;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kiwi_core::bootstrap::open_or_bootstrap;
use kiwi_core::users::REMEMBERED_SESSION_MAX_SECS;
use kiwi_core::{session, Config, SessionCodec};

use crate::executor::SystemExecutor;
use crate::state::AppState;
use crate::view::HtmlView;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kiwi_server=debug,kiwi_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}, using defaults", e);
        Config::default()
    });
    let server = &config.server;

    let cookie_secret = match server
        .cookie_secret_bytes()
        .context("Invalid cookie secret (must be base64)")?
    {
        Some(secret) => secret,
        None => {
            tracing::warn!("No cookie secret configured; sessions will not survive a restart");
            session::generate_secret().to_vec()
        }
    };

    if server.session_max_age_secs < REMEMBERED_SESSION_MAX_SECS {
        tracing::warn!(
            "session_max_age_secs ({}) is shorter than a remembered sign-in ({}); cookies will expire first",
            server.session_max_age_secs,
            REMEMBERED_SESSION_MAX_SECS
        );
    }

    // Prompts on the terminal when the user file does not exist yet
    let users = open_or_bootstrap(&server.users_file, std::io::stdin().lock(), std::io::stdout())
        .with_context(|| format!("Failed to open user file {}", server.users_file.display()))?;

    let state = Arc::new(AppState::new(
        users,
        SessionCodec::new(&cookie_secret, server.session_max_age_secs),
        Arc::new(SystemExecutor::from_config(&config.devices)),
        Arc::new(HtmlView::new(&server.public_prefix)),
        Duration::from_secs(server.flash_idle_secs),
        Duration::from_secs(server.housekeeping_interval_secs),
    ));

    // Start housekeeping
    tokio::spawn(housekeeping::housekeeping_loop(Arc::clone(&state)));

    let app = routes::router(state, &server.public_prefix, &server.public_dir);

    // Start server
    let addr: SocketAddr = server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", server.listen_addr))?;
    tracing::info!("kiwi-server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
