//! Runtime error types.

use drover_core::JobId;

/// Errors surfaced by the orchestrator runtime.
///
/// Runtime *job* failures (non-zero exit, process error) are not errors
/// here: they are recorded on the job and reported via `JobFailed` events.
/// This enum covers the cases where an orchestrator call itself fails.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The OS process could not be spawned (executable missing, permission
    /// denied). The job is recorded as `Failed` before this is returned.
    #[error("Failed to spawn process: {message}")]
    Spawn {
        /// Job that failed to spawn.
        job_id: JobId,
        /// Underlying OS error description.
        message: String,
    },

    /// `wait_for_job` exceeded its deadline. The job is unaffected.
    #[error("Timeout waiting for job {0}")]
    WaitTimeout(JobId),

    /// Operation referenced a job the registry does not know.
    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    /// New work was submitted after `shutdown()`.
    #[error("Orchestrator is shut down")]
    ShutDown,

    /// Settings could not be loaded or were invalid.
    #[error("Settings error: {0}")]
    Settings(#[from] drover_settings::SettingsError),
}
