//! Job lifecycle events.
//!
//! [`JobEvent`] is broadcast by the runtime's event bus to any number of
//! subscribers. Events carry the relevant [`Job`] snapshot (and, for
//! failures, the error) so handlers never need to reach back into the
//! registry. There is no buffering or replay: an event emitted with no
//! subscribers is simply not observed.

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::job::Job;

/// Lifecycle event for one job, or the orchestrator-wide shutdown signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobEvent {
    /// A job transitioned `Queued → Running`.
    JobStarted {
        /// Snapshot of the job at start.
        job: Job,
    },

    /// A progress marker was parsed from the job's stdout.
    ProgressUpdate {
        /// Job that reported progress.
        #[serde(rename = "jobId")]
        job_id: JobId,
        /// Parsed percent, 0-100.
        percent: u8,
        /// Free-text progress message.
        message: String,
    },

    /// A job's process exited with code 0.
    JobCompleted {
        /// Snapshot of the completed job.
        job: Job,
    },

    /// A job failed to spawn, exited non-zero, or errored.
    JobFailed {
        /// Snapshot of the failed job.
        job: Job,
        /// Failure description.
        error: String,
    },

    /// The orchestrator is shutting down. Emitted exactly once.
    Shutdown,
}

impl JobEvent {
    /// Snake-case event name, for logging and subscriber filtering.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobStarted { .. } => "job_started",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::Shutdown => "shutdown",
        }
    }

    /// The job this event concerns, if any.
    #[must_use]
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::JobStarted { job } | Self::JobCompleted { job } | Self::JobFailed { job, .. } => {
                Some(&job.id)
            }
            Self::ProgressUpdate { job_id, .. } => Some(job_id),
            Self::Shutdown => None,
        }
    }
}
