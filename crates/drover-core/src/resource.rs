//! Point-in-time resource usage snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resource usage sampled by the resource monitor.
///
/// Recomputed on a fixed interval (and on demand for queries); read-only
/// to every other component and never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    /// Resident memory of the orchestrator process, in bytes.
    pub memory_bytes: u64,
    /// CPU usage of the orchestrator process, in percent.
    pub cpu_percent: f32,
    /// Jobs currently `Running`.
    pub active_jobs: usize,
    /// All jobs known to the registry, terminal included.
    pub total_jobs: usize,
    /// When the sample was taken.
    pub sampled_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    /// An empty snapshot (no jobs, zero usage), timestamped now.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            memory_bytes: 0,
            cpu_percent: 0.0,
            active_jobs: 0,
            total_jobs: 0,
            sampled_at: Utc::now(),
        }
    }
}
