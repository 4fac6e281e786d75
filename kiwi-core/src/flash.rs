//! One-shot flash messages
//!
//! Values are queued per transport session handle and per channel. Reading a
//! channel empties it under the same lock, so a value is delivered at most
//! once.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::forms::SignInForm;

/// Named flash channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Errors,
    Notifications,
    RejectedForm,
}

impl Channel {
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Errors => "error-messages",
            Channel::Notifications => "notification-messages",
            Channel::RejectedForm => "error-form-requests",
        }
    }
}

/// A queued value; the variant decides the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    Error(String),
    Notification(String),
    RejectedForm(SignInForm),
}

impl Flash {
    pub fn channel(&self) -> Channel {
        match self {
            Flash::Error(_) => Channel::Errors,
            Flash::Notification(_) => Channel::Notifications,
            Flash::RejectedForm(_) => Channel::RejectedForm,
        }
    }

    /// Text payload of message channels
    pub fn into_message(self) -> Option<String> {
        match self {
            Flash::Error(msg) | Flash::Notification(msg) => Some(msg),
            Flash::RejectedForm(_) => None,
        }
    }
}

#[derive(Debug)]
struct Mailbox {
    channels: HashMap<Channel, Vec<Flash>>,
    touched: Instant,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            channels: HashMap::new(),
            touched: Instant::now(),
        }
    }
}

/// Flash storage shared by every request
#[derive(Debug, Default)]
pub struct FlashQueue {
    mailboxes: Mutex<HashMap<String, Mailbox>>,
}

impl FlashQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `flash` to its channel for `handle`
    pub fn push(&self, handle: &str, flash: Flash) {
        let mut mailboxes = self.mailboxes.lock();
        let mailbox = mailboxes.entry(handle.to_string()).or_insert_with(Mailbox::new);
        mailbox.touched = Instant::now();
        mailbox.channels.entry(flash.channel()).or_default().push(flash);
    }

    /// Take every queued value of `channel`, oldest first
    pub fn drain_all(&self, handle: &str, channel: Channel) -> Vec<Flash> {
        let mut mailboxes = self.mailboxes.lock();
        let Some(mailbox) = mailboxes.get_mut(handle) else {
            return Vec::new();
        };

        mailbox.touched = Instant::now();
        let drained = mailbox.channels.remove(&channel).unwrap_or_default();

        if mailbox.channels.is_empty() {
            mailboxes.remove(handle);
        }
        drained
    }

    /// Drain a message channel as plain strings
    pub fn drain_messages(&self, handle: &str, channel: Channel) -> Vec<String> {
        self.drain_all(handle, channel)
            .into_iter()
            .filter_map(Flash::into_message)
            .collect()
    }

    /// Only the first rejected form is returned; any others are discarded
    pub fn take_rejected_form(&self, handle: &str) -> Option<SignInForm> {
        self.drain_all(handle, Channel::RejectedForm)
            .into_iter()
            .find_map(|flash| match flash {
                Flash::RejectedForm(form) => Some(form),
                _ => None,
            })
    }

    /// Drop mailboxes not touched for `max_idle`
    pub fn purge_idle(&self, max_idle: Duration) -> usize {
        let mut mailboxes = self.mailboxes.lock();
        let before = mailboxes.len();
        mailboxes.retain(|_, mailbox| mailbox.touched.elapsed() < max_idle);
        before - mailboxes.len()
    }

    /// Number of sessions with pending flashes
    pub fn len(&self) -> usize {
        self.mailboxes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes.lock().is_empty()
    }
}
