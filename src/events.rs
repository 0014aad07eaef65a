//! Fire-and-forget domain events.
//!
//! Consumers (admin notices, forced-logout listeners, audit trails) register
//! an [`EventSink`]; the core emits and moves on. Listener registration
//! replaces the original's dynamic hook dispatch.

use std::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::store::MethodId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    AccountLocked { user: Uuid },
    AccountUnlocked { user: Uuid },
    MethodSet { user: Uuid, method: MethodId },
    MethodRemoved { user: Uuid, method: MethodId },
    UserAuthenticated { user: Uuid, method: MethodId },
}

impl Event {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AccountLocked { .. } => "account_locked",
            Self::AccountUnlocked { .. } => "account_unlocked",
            Self::MethodSet { .. } => "method_set",
            Self::MethodRemoved { .. } => "method_removed",
            Self::UserAuthenticated { .. } => "user_authenticated",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink: structured log lines.
#[derive(Clone, Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        info!(kind = event.kind(), ?event, "2fa event");
    }
}

/// Test sink that records every emitted event.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events emitted so far.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events mutex poisoned").clone()
    }

    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: Event) {
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(event);
    }
}
