//! Event sink that records everything it sees.

use std::sync::{Mutex, PoisonError};

use crate::observability::{ProvisionEvent, ProvisionObserver};

/// [`ProvisionObserver`] that keeps every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ProvisionEvent>>,
}

impl RecordingObserver {
    /// Returns a snapshot of the events recorded so far, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Counts recorded events matching `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(&ProvisionEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| predicate(event))
            .count()
    }
}

impl ProvisionObserver for RecordingObserver {
    fn on_event(&self, event: &ProvisionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
