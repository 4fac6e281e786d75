//! Shared server state

use std::sync::Arc;
use std::time::Duration;

use kiwi_core::{CommandExecutor, FlashQueue, SessionCodec, UserStore};

use crate::pipeline::Pipeline;
use crate::view::ViewRenderer;

pub type SharedState = Arc<AppState>;

/// Process-wide state. Every piece guards itself, so the struct is shared
/// without an outer lock.
pub struct AppState {
    /// Credential & session store
    pub users: Arc<UserStore>,

    /// Flash messages for every transport session
    pub flashes: Arc<FlashQueue>,

    /// Transport session cookie codec
    pub codec: Arc<SessionCodec>,

    /// Runs device commands
    pub executor: Arc<dyn CommandExecutor>,

    /// Renders pages
    pub view: Arc<dyn ViewRenderer>,

    /// Global middleware stages run before routing
    pub pipeline: Pipeline,

    /// Idle flash mailboxes older than this are evicted
    pub flash_idle: Duration,

    /// Housekeeping interval
    pub housekeeping_interval: Duration,
}

impl AppState {
    pub fn new(
        users: UserStore,
        codec: SessionCodec,
        executor: Arc<dyn CommandExecutor>,
        view: Arc<dyn ViewRenderer>,
        flash_idle: Duration,
        housekeeping_interval: Duration,
    ) -> Self {
        let users = Arc::new(users);
        let flashes = Arc::new(FlashQueue::new());
        let codec = Arc::new(codec);
        let pipeline = Pipeline::standard(users.clone(), codec.clone(), flashes.clone());

        Self {
            users,
            flashes,
            codec,
            executor,
            view,
            pipeline,
            flash_idle,
            housekeeping_interval,
        }
    }
}
