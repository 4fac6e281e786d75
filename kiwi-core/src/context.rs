//! Per-request context
//!
//! Built fresh for every inbound request by the middleware pipeline and
//! dropped with the response. Pipeline stages fill it in order; handlers only
//! read it and push flashes through it.

use std::sync::Arc;

use thiserror::Error;

use crate::flash::Flash;
use crate::forms::SignInForm;
use crate::session::TransportSession;
use crate::users::UserStorage;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Request context has no {0} bound")]
    Unbound(&'static str),
}

#[derive(Clone, Default)]
pub struct RequestContext {
    /// Signed-in user; empty when anonymous
    pub username: String,
    pub error_messages: Vec<String>,
    pub notification_messages: Vec<String>,
    storage: Option<Arc<dyn UserStorage>>,
    session: Option<TransportSession>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("username", &self.username)
            .field("error_messages", &self.error_messages)
            .field("notification_messages", &self.notification_messages)
            .field("storage", &self.storage.is_some())
            .field("session", &self.session.is_some())
            .finish()
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_signed_in(&self) -> bool {
        !self.username.is_empty()
    }

    pub fn bind_storage(&mut self, storage: Arc<dyn UserStorage>) {
        self.storage = Some(storage);
    }

    pub fn bind_session(&mut self, session: TransportSession) {
        self.session = Some(session);
    }

    pub fn storage(&self) -> Result<&Arc<dyn UserStorage>, ContextError> {
        self.storage.as_ref().ok_or(ContextError::Unbound("storage"))
    }

    pub fn session(&self) -> Result<&TransportSession, ContextError> {
        self.session.as_ref().ok_or(ContextError::Unbound("session"))
    }

    pub fn push_error(&self, message: impl Into<String>) -> Result<(), ContextError> {
        self.session()?.push_flash(Flash::Error(message.into()));
        Ok(())
    }

    pub fn push_notification(&self, message: impl Into<String>) -> Result<(), ContextError> {
        self.session()?.push_flash(Flash::Notification(message.into()));
        Ok(())
    }

    /// Queue a failed form so the next page can prefill it
    pub fn push_rejected_form(&self, form: &SignInForm) -> Result<(), ContextError> {
        self.session()?.push_flash(Flash::RejectedForm(form.redacted()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::{Channel, FlashQueue};
    use crate::users::UserStore;

    #[test]
    fn test_anonymous_by_default() {
        let ctx = RequestContext::new();
        assert!(!ctx.is_signed_in());
        assert!(matches!(ctx.storage(), Err(ContextError::Unbound("storage"))));
        assert!(ctx.push_error("nowhere to go").is_err());
    }

    #[test]
    fn test_pushes_go_to_bound_session() {
        let flashes = Arc::new(FlashQueue::new());
        let session = TransportSession::fresh(flashes.clone()).unwrap();

        let mut ctx = RequestContext::new();
        ctx.bind_storage(Arc::new(UserStore::in_memory(Vec::new())));
        ctx.bind_session(session.clone());

        ctx.push_error("bad").unwrap();
        ctx.push_notification("good").unwrap();
        ctx.push_rejected_form(&SignInForm {
            username: "alice".into(),
            password: "secret".into(),
            remember: false,
        })
        .unwrap();

        assert!(ctx.storage().is_ok());
        assert_eq!(session.drain_messages(Channel::Errors), vec!["bad"]);
        assert_eq!(session.drain_messages(Channel::Notifications), vec!["good"]);

        let form = session.take_rejected_form().unwrap();
        assert_eq!(form.username, "alice");
        assert!(form.password.is_empty());
    }
}
