//! [`RedirectMailbox`] – one-slot, latest-wins handoff from the dispatcher to
//! the active state.
//!
//! A message is stored and taken as one unit, so a reader can never pair the
//! route of one request with the action tag of another.  Posting over an
//! unconsumed message replaces it; there is no queue.
//!
//! Waiting never polls: [`pending`][RedirectMailbox::pending] parks on a
//! [`Notify`] that every [`post`][RedirectMailbox::post] wakes.
//!
//! # Example
//!
//! ```rust
//! use patrol_runtime::mailbox::RedirectMailbox;
//! use patrol_types::{AgentStatus, Intent, RedirectMessage};
//!
//! let mailbox = RedirectMailbox::new();
//! mailbox.post(RedirectMessage { intent: Intent::Stop, issued_at: AgentStatus::Patrolling });
//! assert!(mailbox.has_pending());
//! assert_eq!(mailbox.take().map(|m| m.intent), Some(Intent::Stop));
//! assert!(mailbox.take().is_none());
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

use patrol_types::RedirectMessage;
use tokio::sync::Notify;

/// Single-slot redirect mailbox.  See the [module docs](self).
#[derive(Debug, Default)]
pub struct RedirectMailbox {
    slot: Mutex<Option<RedirectMessage>>,
    notify: Notify,
}

impl RedirectMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `message`, replacing any unconsumed one, and wake the owner.
    ///
    /// Returns the message that was overwritten, if any.
    pub fn post(&self, message: RedirectMessage) -> Option<RedirectMessage> {
        let replaced = self.slot().replace(message);
        self.notify.notify_one();
        replaced
    }

    /// Remove and return the waiting message without blocking.
    pub fn take(&self) -> Option<RedirectMessage> {
        self.slot().take()
    }

    pub fn has_pending(&self) -> bool {
        self.slot().is_some()
    }

    /// Resolve once a message is waiting.  The message is left in place.
    pub async fn pending(&self) {
        loop {
            if self.has_pending() {
                return;
            }
            // `notify_one` stores a permit when nobody is parked yet, so a
            // post racing with the check above is not lost.
            self.notify.notified().await;
        }
    }

    /// Wait for a message and take it.
    pub async fn recv(&self) -> RedirectMessage {
        loop {
            self.pending().await;
            if let Some(message) = self.take() {
                return message;
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<RedirectMessage>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
