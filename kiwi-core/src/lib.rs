//! kiwi-core: Shared library for the kiwi home control panel
//!
//! This crate provides:
//! - Credential & session store backed by a JSON user file
//! - Signed transport sessions and one-shot flash messages
//! - The per-request context filled by the server pipeline
//! - Device command sets and the executor seam

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod context;
pub mod flash;
pub mod forms;
pub mod session;
pub mod token;
pub mod users;

pub use command::{CommandError, CommandExecutor, Device, DeviceCommand, ExecutorError};
pub use config::Config;
pub use context::{ContextError, RequestContext};
pub use flash::{Channel, Flash, FlashQueue};
pub use forms::SignInForm;
pub use session::{SessionCodec, SessionError, TransportSession};
pub use users::{StoreError, UserRecord, UserStorage, UserStore};

/// Default HTTP port for kiwi-server
pub const DEFAULT_HTTP_PORT: u16 = 8080;
