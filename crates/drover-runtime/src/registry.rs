//! Job registry — the single source of truth for job state.
//!
//! Every `Job` lives in the registry from creation until the orchestrator
//! is dropped; completed jobs stay queryable. All mutation goes through
//! registry methods, which enforce the state machine:
//!
//! - terminal states (`Completed`, `Failed`, `Cancelled`) never transition
//! - entering `Running` stamps `started_at` and records the pid
//! - every other transition stamps `ended_at`
//!
//! Each entry also carries the job's cancellation token (SIGTERM lever for
//! the supervising task), a `Notify` that fires on terminal transitions
//! (the lever for `wait_for_job`), and a bounded tail of recent output
//! lines for failure diagnostics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use drover_core::{Job, JobId, JobOptions, JobStatus};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Output tail
// ─────────────────────────────────────────────────────────────────────────────

/// Which process stream a captured line came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Ring buffer of the most recent output lines for one job.
#[derive(Debug)]
struct OutputTail {
    lines: VecDeque<(OutputStream, String)>,
    cap: usize,
}

impl OutputTail {
    fn new(cap: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(cap.min(64)),
            cap,
        }
    }

    fn push(&mut self, stream: OutputStream, line: String) {
        if self.lines.len() == self.cap {
            let _ = self.lines.pop_front();
        }
        self.lines.push_back((stream, line));
    }

    fn stderr_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter(|(s, _)| *s == OutputStream::Stderr)
            .map(|(_, l)| l.clone())
            .collect()
    }

    fn all_lines(&self) -> Vec<String> {
        self.lines.iter().map(|(_, l)| l.clone()).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobRegistry
// ─────────────────────────────────────────────────────────────────────────────

/// One tracked job plus its supervision levers.
struct JobEntry {
    job: Job,
    /// Creation order, for FIFO promotion.
    seq: u64,
    /// Fires when the job reaches a terminal state.
    done: Arc<Notify>,
    /// Cancelling this delivers SIGTERM via the supervising task.
    cancel: CancellationToken,
    output: OutputTail,
}

/// In-memory map of job ID → job record, with guarded transitions.
pub struct JobRegistry {
    jobs: DashMap<JobId, JobEntry>,
    next_seq: AtomicU64,
    tail_lines: usize,
}

impl JobRegistry {
    /// Create an empty registry retaining `tail_lines` output lines per job.
    #[must_use]
    pub fn new(tail_lines: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            next_seq: AtomicU64::new(0),
            tail_lines,
        }
    }

    /// Allocate a new job in `Queued` and return its ID immediately.
    pub fn create_job(&self, command: &str, args: Vec<String>, options: JobOptions) -> JobId {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = JobId::from_number(seq);
        let job = Job::new(id.clone(), command.to_owned(), args, options);
        let entry = JobEntry {
            job,
            seq,
            done: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            output: OutputTail::new(self.tail_lines),
        };
        let _ = self.jobs.insert(id.clone(), entry);
        id
    }

    /// Snapshot of one job.
    #[must_use]
    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|e| e.job.clone())
    }

    /// Snapshots of all known jobs, in creation order.
    #[must_use]
    pub fn list(&self) -> Vec<Job> {
        let mut entries: Vec<(u64, Job)> = self
            .jobs
            .iter()
            .map(|e| (e.seq, e.job.clone()))
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, job)| job).collect()
    }

    /// Queued jobs in creation (FIFO) order.
    #[must_use]
    pub fn queued_fifo(&self) -> Vec<Job> {
        let mut queued: Vec<(u64, Job)> = self
            .jobs
            .iter()
            .filter(|e| e.job.status == JobStatus::Queued)
            .map(|e| (e.seq, e.job.clone()))
            .collect();
        queued.sort_by_key(|(seq, _)| *seq);
        queued.into_iter().map(|(_, job)| job).collect()
    }

    /// Jobs currently `Running`.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|e| e.job.status == JobStatus::Running)
            .count()
    }

    /// Jobs currently `Running` for one command.
    #[must_use]
    pub fn running_count_for(&self, command: &str) -> usize {
        self.jobs
            .iter()
            .filter(|e| e.job.status == JobStatus::Running && e.job.command == command)
            .count()
    }

    /// Total jobs known, terminal included.
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.jobs.len()
    }

    /// Whether an older job of the same command is still queued ahead of
    /// `id`. Such a job keeps its place: newer submissions must queue
    /// behind it even when a slot is free.
    #[must_use]
    pub fn has_older_queued(&self, id: &JobId, command: &str) -> bool {
        let Some(seq) = self.jobs.get(id).map(|e| e.seq) else {
            return false;
        };
        self.jobs.iter().any(|e| {
            e.seq < seq && e.job.status == JobStatus::Queued && e.job.command == command
        })
    }

    /// IDs of all non-terminal jobs (for shutdown's cancel-all).
    #[must_use]
    pub fn non_terminal_ids(&self) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|e| !e.job.status.is_terminal())
            .map(|e| e.job.id.clone())
            .collect()
    }

    /// The job's cancellation token (SIGTERM lever for the supervisor).
    #[must_use]
    pub fn cancel_token(&self, id: &JobId) -> Option<CancellationToken> {
        self.jobs.get(id).map(|e| e.cancel.clone())
    }

    /// The job's terminal-state notifier, for `wait_for_job`.
    #[must_use]
    pub fn done_handle(&self, id: &JobId) -> Option<Arc<Notify>> {
        self.jobs.get(id).map(|e| Arc::clone(&e.done))
    }

    // ── Transitions ─────────────────────────────────────────────────────

    /// `Queued → Running`: stamp `started_at`, record the pid.
    ///
    /// Returns the updated snapshot, or `None` if the job is unknown or no
    /// longer `Queued` (e.g. cancelled while the spawn was in flight).
    pub fn mark_running(&self, id: &JobId, pid: Option<u32>) -> Option<Job> {
        let mut entry = self.jobs.get_mut(id)?;
        if entry.job.status != JobStatus::Queued {
            return None;
        }
        entry.job.status = JobStatus::Running;
        entry.job.started_at = Some(Utc::now());
        entry.job.pid = pid;
        Some(entry.job.clone())
    }

    /// Terminal transition to `Completed` (exit code 0).
    pub fn mark_completed(&self, id: &JobId, exit_code: i32) -> Option<Job> {
        let job = {
            let mut entry = self.jobs.get_mut(id)?;
            if entry.job.status.is_terminal() {
                return None;
            }
            entry.job.status = JobStatus::Completed;
            entry.job.ended_at = Some(Utc::now());
            entry.job.exit_code = Some(exit_code);
            entry.job.progress_percent = 100;
            entry.job.clone()
        };
        self.notify_done(id);
        Some(job)
    }

    /// Terminal transition to `Failed` (spawn error, non-zero exit, or
    /// process error).
    pub fn mark_failed(&self, id: &JobId, error: &str, exit_code: Option<i32>) -> Option<Job> {
        let job = {
            let mut entry = self.jobs.get_mut(id)?;
            if entry.job.status.is_terminal() {
                return None;
            }
            entry.job.status = JobStatus::Failed;
            entry.job.ended_at = Some(Utc::now());
            entry.job.exit_code = exit_code;
            entry.job.error = Some(error.to_owned());
            entry.job.clone()
        };
        self.notify_done(id);
        Some(job)
    }

    /// Cancel a job: `false` if unknown or already terminal; otherwise the
    /// cancellation token is triggered (the supervisor delivers SIGTERM)
    /// and the job transitions to `Cancelled`. Never panics.
    ///
    /// Returns as soon as the signal is requested, not once the process
    /// has actually exited.
    pub fn cancel(&self, id: &JobId) -> bool {
        let cancel = {
            let Some(mut entry) = self.jobs.get_mut(id) else {
                return false;
            };
            if entry.job.status.is_terminal() {
                return false;
            }
            entry.job.status = JobStatus::Cancelled;
            entry.job.ended_at = Some(Utc::now());
            entry.cancel.clone()
        };
        cancel.cancel();
        self.notify_done(id);
        true
    }

    /// Record a parsed progress marker. Ignored once the job is terminal.
    pub fn update_progress(&self, id: &JobId, percent: u8, message: &str) -> Option<Job> {
        let mut entry = self.jobs.get_mut(id)?;
        if entry.job.status.is_terminal() {
            return None;
        }
        entry.job.progress_percent = percent.min(100);
        entry.job.progress_message = message.to_owned();
        Some(entry.job.clone())
    }

    // ── Output capture ──────────────────────────────────────────────────

    /// Append one captured output line to the job's bounded tail.
    pub fn append_output(&self, id: &JobId, stream: OutputStream, line: String) {
        if let Some(mut entry) = self.jobs.get_mut(id) {
            entry.output.push(stream, line);
        }
    }

    /// Recent stderr lines, newest last. Empty for unknown jobs.
    #[must_use]
    pub fn stderr_tail(&self, id: &JobId) -> Vec<String> {
        self.jobs.get(id).map_or_else(Vec::new, |e| e.output.stderr_lines())
    }

    /// Recent output lines from both streams, newest last.
    #[must_use]
    pub fn output_tail(&self, id: &JobId) -> Vec<String> {
        self.jobs.get(id).map_or_else(Vec::new, |e| e.output.all_lines())
    }

    fn notify_done(&self, id: &JobId) {
        if let Some(entry) = self.jobs.get(id) {
            entry.done.notify_waiters();
        }
    }
}
