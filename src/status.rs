//! Aggregate display state derived from the polling stream.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::poller::{CycleObserver, CycleOutcome, Snapshot};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AircraftStatus {
    pub aircraft_count: usize,
    /// time of the last cycle in which the feed answered
    pub last_updated: Option<DateTime<Utc>>,
    pub loading: bool,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

impl AircraftStatus {
    /// One line status text, times in local time.
    pub fn summary(&self) -> String {
        if self.loading {
            "Updating...".to_string()
        } else if let Some(updated) = self.last_updated {
            format!("Last update: {}", updated.with_timezone(&Local).format("%H:%M:%S"))
        } else {
            "Loading...".to_string()
        }
    }
}

/// Shared handle to the current [`AircraftStatus`]. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct StatusReporter {
    status: Arc<RwLock<AircraftStatus>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> AircraftStatus {
        self.status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update(&self, f: impl FnOnce(&mut AircraftStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut *status)
    }
}

impl CycleObserver for StatusReporter {
    fn loading_changed(&mut self, loading: bool) {
        self.update(|status| status.loading = loading);
    }

    fn snapshot_published(&mut self, snapshot: &Snapshot) {
        self.update(|status| {
            status.aircraft_count = snapshot.aircraft.len();
            status.loading = false;
            match &snapshot.outcome {
                CycleOutcome::Observed { .. } => status.last_updated = Some(snapshot.published_at),
                CycleOutcome::Failed { reason } => {
                    status.last_failure = Some(snapshot.published_at);
                    status.last_failure_reason = Some(reason.clone());
                }
            }
        });
    }
}
