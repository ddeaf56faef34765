//! Connection status publishing.
//!
//! Only the latest status matters, so a `watch` channel backs the publisher:
//! every subscriber sees the newest snapshot and missed intermediate states
//! are not queued.

use crate::core::transport::TransportErrorKind;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Lifecycle state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Closed,
    Opening,
    Open,
    Error(TransportErrorKind),
}

/// Connection state plus the human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    pub text: String,
}

impl StatusSnapshot {
    pub fn disconnected() -> Self {
        Self {
            state: ConnectionState::Closed,
            text: "Disconnected".to_string(),
        }
    }
}

/// Cloneable handle publishing status changes to any number of subscribers.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    sender: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::disconnected());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish a new snapshot. Returns `false` when it equals the current one,
    /// in which case subscribers are not woken.
    pub fn publish(&self, state: ConnectionState, text: impl Into<String>) -> bool {
        let next = StatusSnapshot {
            state,
            text: text.into(),
        };
        self.sender.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    pub fn current(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.sender.borrow().state
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Opening => write!(f, "Opening"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Error(kind) => write!(f, "Error: {}", kind),
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
