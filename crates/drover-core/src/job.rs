//! Job records and the lifecycle state machine.
//!
//! A [`Job`] is one tracked invocation of a command running as a background
//! OS process. Jobs are created in [`JobStatus::Queued`] and move through:
//!
//! ```text
//! Queued ──spawn──▶ Running ──exit 0──▶ Completed
//!    │                 │──exit ≠0/err─▶ Failed
//!    │                 │──cancel──────▶ Cancelled
//!    └──cancel/spawn error────────────▶ Cancelled / Failed
//! ```
//!
//! Terminal states never transition further. Only the job registry mutates
//! a `Job`; everyone else sees clones.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::JobId;

// ─────────────────────────────────────────────────────────────────────────────
// JobStatus
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created but not yet admitted; waiting for a concurrency slot.
    Queued,
    /// The OS process has been spawned and is running.
    Running,
    /// The process exited with code 0.
    Completed,
    /// The process could not be spawned, exited non-zero, or errored.
    Failed,
    /// The job was cancelled before reaching a terminal state.
    Cancelled,
}

impl JobStatus {
    /// Whether this state is terminal (no further transitions).
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Wire/report name for the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobOptions
// ─────────────────────────────────────────────────────────────────────────────

/// Per-invocation options recognized by the orchestrator.
///
/// `foreground` wins when both placement flags are set. Command-specific
/// options the orchestrator does not interpret travel in `extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    /// Force the command into the background.
    pub background: bool,
    /// Force the command into the foreground (wins over `background`).
    pub foreground: bool,
    /// Open extension map for command-specific options.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl JobOptions {
    /// Options forcing background execution.
    #[must_use]
    pub fn background() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    /// Options forcing foreground execution.
    #[must_use]
    pub fn foreground() -> Self {
        Self {
            foreground: true,
            ..Self::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// One tracked invocation of a command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Registry-assigned identifier.
    pub id: JobId,
    /// Command name.
    pub command: String,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Options the job was created with.
    pub options: JobOptions,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// OS process ID, set on transition to `Running`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// When the job record was created.
    pub created_at: DateTime<Utc>,
    /// When the process was spawned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Last reported progress, 0-100.
    pub progress_percent: u8,
    /// Last reported progress message.
    pub progress_message: String,
    /// Process exit code, if the process exited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Failure description, set when the job fails.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Create a new job in `Queued`.
    #[must_use]
    pub fn new(id: JobId, command: String, args: Vec<String>, options: JobOptions) -> Self {
        Self {
            id,
            command,
            args,
            options,
            status: JobStatus::Queued,
            pid: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            progress_percent: 0,
            progress_message: String::new(),
            exit_code: None,
            error: None,
        }
    }

    /// Wall-clock duration: start to end for finished jobs, start to now
    /// for running ones, `None` before the process starts.
    #[must_use]
    pub fn duration_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let end = self.ended_at.unwrap_or_else(Utc::now);
        u64::try_from((end - started).num_milliseconds()).ok()
    }
}
