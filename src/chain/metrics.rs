//! Per-persona invocation counters.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persona::Persona;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_invocations: u64,
    pub successful_invocations: u64,
    pub total_duration_seconds: f64,
    pub average_duration_seconds: f64,
    pub last_invocation: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    fn apply(&mut self, duration_seconds: f64, success: bool) {
        self.total_invocations += 1;
        self.total_duration_seconds += duration_seconds;
        if success {
            self.successful_invocations += 1;
        }
        self.average_duration_seconds =
            self.total_duration_seconds / self.total_invocations as f64;
        self.last_invocation = Some(Utc::now());
    }
}

/// Each update is one read-modify-write under the lock, so concurrent
/// invocations of the same persona never lose a count.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    entries: Mutex<BTreeMap<Persona, MetricsSnapshot>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, persona: Persona, duration_seconds: f64, success: bool) {
        self.lock()
            .entry(persona)
            .or_default()
            .apply(duration_seconds, success);
    }

    /// Counters for one persona; `None` if it was never recorded.
    pub fn snapshot(&self, persona: Persona) -> Option<MetricsSnapshot> {
        self.lock().get(&persona).cloned()
    }

    pub fn snapshot_all(&self) -> BTreeMap<Persona, MetricsSnapshot> {
        self.lock().clone()
    }

    // A panic mid-update cannot leave a half-applied entry behind, so the
    // data is still usable after poisoning.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<Persona, MetricsSnapshot>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
