//! Transport sessions
//!
//! The browser holds one signed cookie carrying an opaque handle plus a small
//! string map. The handle keys the flash queue; the map holds the
//! authentication token under [`SESSION_TOKEN_KEY`]. Cookies are HS256 JWTs
//! signed with the configured cookie secret, so a client cannot forge a
//! handle or a token value.

use std::collections::BTreeMap;
use std::sync::Arc;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flash::{Channel, Flash, FlashQueue};
use crate::forms::SignInForm;
use crate::token::generate_token;

/// Name of the transport session cookie
pub const SESSION_COOKIE: &str = "kiwi-session";

/// Session value holding the authentication token
pub const SESSION_TOKEN_KEY: &str = "session_token";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session cookie codec failed: {0}")]
    Codec(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to generate session handle: {0}")]
    Handle(#[from] rand::Error),
}

/// Claims stored in the cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sid: String,
    #[serde(default)]
    values: BTreeMap<String, String>,
    exp: u64,
}

#[derive(Debug)]
struct SessionState {
    handle: String,
    values: BTreeMap<String, String>,
    is_new: bool,
    dirty: bool,
}

/// Per-request view of the browser's transport session.
///
/// Clones share state, so the pipeline can save whatever the handler changed.
#[derive(Debug, Clone)]
pub struct TransportSession {
    state: Arc<Mutex<SessionState>>,
    flashes: Arc<FlashQueue>,
}

impl TransportSession {
    /// Start a session with a new random handle
    pub fn fresh(flashes: Arc<FlashQueue>) -> Result<Self, SessionError> {
        Ok(Self::build(generate_token()?, BTreeMap::new(), true, flashes))
    }

    fn build(handle: String, values: BTreeMap<String, String>, is_new: bool, flashes: Arc<FlashQueue>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                handle,
                values,
                is_new,
                dirty: false,
            })),
            flashes,
        }
    }

    pub fn handle(&self) -> String {
        self.state.lock().handle.clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.state.lock().values.get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        let mut state = self.state.lock();
        state.values.insert(key.to_string(), value.into());
        state.dirty = true;
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        if state.values.remove(key).is_some() {
            state.dirty = true;
        }
    }

    /// Whether the cookie has to be (re)sent with the response
    pub fn needs_save(&self) -> bool {
        let state = self.state.lock();
        state.is_new || state.dirty
    }

    pub fn push_flash(&self, flash: Flash) {
        self.flashes.push(&self.handle(), flash);
    }

    pub fn drain(&self, channel: Channel) -> Vec<Flash> {
        self.flashes.drain_all(&self.handle(), channel)
    }

    pub fn drain_messages(&self, channel: Channel) -> Vec<String> {
        self.flashes.drain_messages(&self.handle(), channel)
    }

    pub fn take_rejected_form(&self) -> Option<SignInForm> {
        self.flashes.take_rejected_form(&self.handle())
    }
}

/// Signs and verifies transport session cookies
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    max_age_secs: u64,
}

impl SessionCodec {
    /// # Arguments
    /// * `secret` - HMAC secret for signing cookies (should be >= 32 bytes)
    /// * `max_age_secs` - cookie lifetime
    pub fn new(secret: &[u8], max_age_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            max_age_secs,
        }
    }

    /// Restore the session from a cookie value, or start a fresh one when
    /// the cookie is absent, expired or fails verification
    pub fn open(&self, cookie: Option<&str>, flashes: Arc<FlashQueue>) -> Result<TransportSession, SessionError> {
        if let Some(value) = cookie {
            match decode::<SessionClaims>(value, &self.decoding_key, &self.validation) {
                Ok(data) => {
                    return Ok(TransportSession::build(data.claims.sid, data.claims.values, false, flashes));
                }
                Err(e) => {
                    tracing::debug!("Discarding transport session cookie: {}", e);
                }
            }
        }
        TransportSession::fresh(flashes)
    }

    /// Encode the session as a signed cookie value
    pub fn encode(&self, session: &TransportSession) -> Result<String, SessionError> {
        let claims = {
            let state = session.state.lock();
            SessionClaims {
                sid: state.handle.clone(),
                values: state.values.clone(),
                exp: jsonwebtoken::get_current_timestamp() + self.max_age_secs,
            }
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Cookie lifetime in seconds
    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }
}

/// Generate a random secret for cookie signing
pub fn generate_secret() -> [u8; 32] {
    use rand::Rng;
    rand::thread_rng().r#gen()
}
