//! Process execution and supervision.
//!
//! The executor owns the OS-process boundary: it spawns admitted jobs with
//! `tokio::process::Command`, streams their stdout/stderr line-by-line,
//! forwards parsed progress markers into the registry, and records the
//! exit outcome. Spawning never blocks the caller; everything after the
//! spawn happens in detached supervision tasks.
//!
//! Whenever a job reaches a terminal state its concurrency slot frees, and
//! the executor opportunistically promotes queued jobs (FIFO) into it.

use std::process::Stdio;
use std::sync::Arc;

use drover_core::{JobEvent, JobId, JobOptions};
use futures::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::admission::AdmissionController;
use crate::bus::EventBus;
use crate::errors::OrchestratorError;
use crate::progress::ProgressParser;
use crate::registry::{JobRegistry, OutputStream};

/// How many trailing stderr lines go into a failure message.
const ERROR_TAIL_LINES: usize = 5;

/// Spawns and supervises background job processes.
#[derive(Clone)]
pub struct ProcessExecutor {
    registry: Arc<JobRegistry>,
    admission: Arc<AdmissionController>,
    bus: Arc<EventBus>,
    parser: Arc<dyn ProgressParser>,
}

impl ProcessExecutor {
    /// Create an executor over shared registry, admission, and bus state.
    #[must_use]
    pub fn new(
        registry: Arc<JobRegistry>,
        admission: Arc<AdmissionController>,
        bus: Arc<EventBus>,
        parser: Arc<dyn ProgressParser>,
    ) -> Self {
        Self {
            registry,
            admission,
            bus,
            parser,
        }
    }

    /// Create the job, attempt admission, and spawn if admitted.
    ///
    /// Always returns a job ID on success — a job that cannot start yet
    /// stays `Queued` and is promoted later. The one failure case is the
    /// spawn itself (executable missing): the job is recorded as `Failed`
    /// and the error is returned.
    pub async fn execute_in_background(
        &self,
        command: &str,
        args: Vec<String>,
        options: JobOptions,
    ) -> Result<JobId, OrchestratorError> {
        let id = self.registry.create_job(command, args, options);
        if self.registry.has_older_queued(&id, command) {
            // Older queued jobs of the same command start first, even when
            // a slot happens to be free right now.
            debug!(job_id = %id, command, "job queued behind older jobs of the same command");
            self.promote_queued().await;
        } else if self.admission.can_start(&self.registry, command) {
            self.spawn_job(&id).await?;
        } else {
            debug!(job_id = %id, command, "job queued, concurrency limits reached");
        }
        Ok(id)
    }

    /// Spawn the OS process for a queued job and start supervision.
    pub async fn spawn_job(&self, id: &JobId) -> Result<(), OrchestratorError> {
        let job = self
            .registry
            .get(id)
            .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))?;
        if job.status != drover_core::JobStatus::Queued {
            return Ok(());
        }

        let mut cmd = Command::new(&job.command);
        let _ = cmd
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(job_id = %id, command = %job.command, "spawning process");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to spawn process: {e}");
                if let Some(failed) = self.registry.mark_failed(id, &message, None) {
                    let _ = self.bus.emit(JobEvent::JobFailed {
                        job: failed,
                        error: message,
                    });
                }
                return Err(OrchestratorError::Spawn {
                    job_id: id.clone(),
                    message: e.to_string(),
                });
            }
        };

        let pid = child.id();
        let Some(started) = self.registry.mark_running(id, pid) else {
            // Cancelled while the spawn was in flight; reap immediately.
            let _ = child.start_kill();
            return Ok(());
        };
        let _ = self.bus.emit(JobEvent::JobStarted { job: started });

        let cancel = self
            .registry
            .cancel_token(id)
            .unwrap_or_else(CancellationToken::new);

        let this = self.clone();
        let job_id = id.clone();
        drop(tokio::spawn(async move {
            this.supervise(job_id, child, cancel).await;
        }));
        Ok(())
    }

    /// Supervise one running process until exit or cancellation, then free
    /// the slot and promote queued jobs.
    async fn supervise(&self, id: JobId, mut child: Child, cancel: CancellationToken) {
        let stdout_task = child.stdout.take().map(|out| {
            let this = self.clone();
            let id = id.clone();
            tokio::spawn(async move { this.read_stdout(&id, out).await })
        });
        let stderr_task = child.stderr.take().map(|err| {
            let this = self.clone();
            let id = id.clone();
            tokio::spawn(async move { this.read_lines(&id, OutputStream::Stderr, err).await })
        });

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            () = cancel.cancelled() => None,
        };
        let exit = match waited {
            Some(status) => Some(status),
            None => {
                debug!(job_id = %id, "cancellation requested, sending SIGTERM");
                let _ = child.start_kill();
                let _ = child.wait().await;
                None
            }
        };

        // Drain the readers so the tail and progress are complete.
        if let Some(task) = stdout_task {
            let _ = task.await;
        }
        if let Some(task) = stderr_task {
            let _ = task.await;
        }

        match exit {
            // Cancelled: the registry already transitioned the job.
            None => debug!(job_id = %id, "process cancelled"),
            Some(Ok(status)) if status.success() => {
                if let Some(job) = self.registry.mark_completed(&id, 0) {
                    debug!(job_id = %id, "job completed");
                    let _ = self.bus.emit(JobEvent::JobCompleted { job });
                }
            }
            Some(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                let error = self.failure_message(&id, code);
                if let Some(job) = self.registry.mark_failed(&id, &error, Some(code)) {
                    warn!(job_id = %id, code, "job failed");
                    let _ = self.bus.emit(JobEvent::JobFailed { job, error });
                }
            }
            Some(Err(e)) => {
                let error = format!("Process wait failed: {e}");
                if let Some(job) = self.registry.mark_failed(&id, &error, None) {
                    warn!(job_id = %id, error = %e, "process wait failed");
                    let _ = self.bus.emit(JobEvent::JobFailed { job, error });
                }
            }
        }

        // The slot freed; give queued jobs a chance.
        self.promote_queued().await;
    }

    /// Scan stdout for progress markers; capture every line in the tail.
    async fn read_stdout(&self, id: &JobId, out: impl AsyncRead + Unpin) {
        let mut lines = BufReader::new(out).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(update) = self.parser.parse_line(&line) {
                if self
                    .registry
                    .update_progress(id, update.percent, &update.message)
                    .is_some()
                {
                    let _ = self.bus.emit(JobEvent::ProgressUpdate {
                        job_id: id.clone(),
                        percent: update.percent,
                        message: update.message,
                    });
                }
            }
            self.registry.append_output(id, OutputStream::Stdout, line);
        }
    }

    /// Capture lines from a stream into the job's output tail.
    async fn read_lines(&self, id: &JobId, stream: OutputStream, source: impl AsyncRead + Unpin) {
        let mut lines = BufReader::new(source).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            self.registry.append_output(id, stream, line);
        }
    }

    /// Build a failure message from the stderr tail, falling back to the
    /// exit code.
    fn failure_message(&self, id: &JobId, code: i32) -> String {
        let stderr = self.registry.stderr_tail(id);
        if stderr.is_empty() {
            format!("Process exited with code {code}")
        } else {
            let skip = stderr.len().saturating_sub(ERROR_TAIL_LINES);
            stderr[skip..].join("\n")
        }
    }

    /// Promote queued jobs into freed slots, FIFO.
    ///
    /// Boxed so supervision tasks can call back into promotion without a
    /// recursive future type.
    pub fn promote_queued(&self) -> BoxFuture<'static, ()> {
        let this = self.clone();
        Box::pin(async move {
            for id in this.admission.promotable(&this.registry) {
                debug!(job_id = %id, "promoting queued job");
                if let Err(e) = this.spawn_job(&id).await {
                    warn!(job_id = %id, error = %e, "failed to promote queued job");
                }
            }
        })
    }

    /// Resolve once the job reaches a terminal state, or fail with a
    /// timeout error. Timing out has no effect on the job.
    pub async fn wait_for_job(
        &self,
        id: &JobId,
        timeout: std::time::Duration,
    ) -> Result<drover_core::Job, OrchestratorError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let done = self
                .registry
                .done_handle(id)
                .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))?;
            // Register interest before checking state so a transition
            // between the check and the await is never missed.
            let notified = done.notified();
            let job = self
                .registry
                .get(id)
                .ok_or_else(|| OrchestratorError::JobNotFound(id.clone()))?;
            if job.status.is_terminal() {
                return Ok(job);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(OrchestratorError::WaitTimeout(id.clone()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::MarkerProgressParser;
    use drover_core::{JobStatus, ProfileRegistry};
    use std::time::Duration;

    fn executor(max_jobs: usize) -> (ProcessExecutor, Arc<JobRegistry>, Arc<EventBus>) {
        let registry = Arc::new(JobRegistry::new(50));
        let profiles = Arc::new(ProfileRegistry::with_defaults());
        let admission = Arc::new(AdmissionController::new(profiles, max_jobs));
        let bus = Arc::new(EventBus::new());
        let exec = ProcessExecutor::new(
            Arc::clone(&registry),
            admission,
            Arc::clone(&bus),
            Arc::new(MarkerProgressParser),
        );
        (exec, registry, bus)
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".into(), script.into()]
    }

    #[tokio::test]
    async fn completed_job_end_to_end() {
        let (exec, _, _) = executor(4);
        let id = exec
            .execute_in_background("sh", sh("exit 0"), JobOptions::default())
            .await
            .unwrap();

        let job = exec.wait_for_job(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.exit_code, Some(0));
        assert!(job.started_at.is_some());
        assert!(job.ended_at.is_some());
        assert!(job.pid.is_some());
    }

    #[tokio::test]
    async fn failed_job_records_exit_code() {
        let (exec, _, _) = executor(4);
        let id = exec
            .execute_in_background("sh", sh("exit 3"), JobOptions::default())
            .await
            .unwrap();

        let job = exec.wait_for_job(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.exit_code, Some(3));
        assert!(job.error.unwrap().contains("exited with code 3"));
    }

    #[tokio::test]
    async fn stderr_tail_becomes_failure_error() {
        let (exec, _, _) = executor(4);
        let id = exec
            .execute_in_background("sh", sh("echo boom >&2; exit 1"), JobOptions::default())
            .await
            .unwrap();

        let job = exec.wait_for_job(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn progress_markers_flow_through() {
        let (exec, _, bus) = executor(4);
        let mut rx = bus.subscribe();
        let id = exec
            .execute_in_background(
                "sh",
                sh("echo PROGRESS:25:quarter; echo PROGRESS:80:almost; echo plain line"),
                JobOptions::default(),
            )
            .await
            .unwrap();

        let job = exec.wait_for_job(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress_message, "almost");

        let mut percents = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let JobEvent::ProgressUpdate { percent, .. } = event {
                percents.push(percent);
            }
        }
        assert_eq!(percents, vec![25, 80]);
    }

    #[tokio::test]
    async fn spawn_failure_rejects_and_marks_failed() {
        let (exec, registry, _) = executor(4);
        let err = exec
            .execute_in_background(
                "definitely-not-a-real-binary-xyz",
                vec![],
                JobOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Failed to spawn process"));

        // The job was created and recorded as failed before the error
        // surfaced.
        let jobs = registry.list();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(jobs[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to spawn process"));
    }

    #[tokio::test]
    async fn over_ceiling_job_stays_queued() {
        let (exec, registry, _) = executor(1);
        let running = exec
            .execute_in_background("sh", sh("sleep 5"), JobOptions::default())
            .await
            .unwrap();
        let queued = exec
            .execute_in_background("sh", sh("exit 0"), JobOptions::default())
            .await
            .unwrap();

        assert_eq!(registry.get(&running).unwrap().status, JobStatus::Running);
        assert_eq!(registry.get(&queued).unwrap().status, JobStatus::Queued);

        assert!(registry.cancel(&running));
    }

    #[tokio::test]
    async fn queued_job_promoted_when_slot_frees() {
        let (exec, _, _) = executor(1);
        let first = exec
            .execute_in_background("sh", sh("sleep 0.2"), JobOptions::default())
            .await
            .unwrap();
        let second = exec
            .execute_in_background("sh", sh("exit 0"), JobOptions::default())
            .await
            .unwrap();

        let job = exec
            .wait_for_job(&second, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);

        let first_job = exec.wait_for_job(&first, Duration::from_secs(5)).await.unwrap();
        assert_eq!(first_job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn wait_timeout_leaves_job_running() {
        let (exec, registry, _) = executor(4);
        let id = exec
            .execute_in_background("sh", sh("sleep 5"), JobOptions::default())
            .await
            .unwrap();

        let err = exec
            .wait_for_job(&id, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Timeout waiting for job"));
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Running);

        assert!(registry.cancel(&id));
    }

    #[tokio::test]
    async fn wait_on_unknown_job_is_not_found() {
        let (exec, _, _) = executor(4);
        let err = exec
            .wait_for_job(&JobId::from_string("job-404".into()), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn cancel_running_job_terminates_process() {
        let (exec, registry, bus) = executor(4);
        let mut rx = bus.subscribe();
        let id = exec
            .execute_in_background("sh", sh("sleep 30"), JobOptions::default())
            .await
            .unwrap();

        assert!(registry.cancel(&id));
        let job = exec.wait_for_job(&id, Duration::from_secs(5)).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);

        // Give the supervisor time to reap; it must not emit a failure for
        // a cancelled job.
        tokio::time::sleep(Duration::from_millis(200)).await;
        while let Ok(event) = rx.try_recv() {
            assert_ne!(event.event_type(), "job_failed");
        }
    }

    #[tokio::test]
    async fn per_command_limit_queues_same_command_only() {
        // Give "sh" a profile with a per-command limit of 1 so the global
        // ceiling is not the binding constraint.
        let registry = Arc::new(JobRegistry::new(50));
        let profiles = Arc::new(ProfileRegistry::with_overrides([
            drover_core::CommandProfile::new("sh", true, 1),
        ]));
        let admission = Arc::new(AdmissionController::new(profiles, 8));
        let bus = Arc::new(EventBus::new());
        let exec = ProcessExecutor::new(
            Arc::clone(&registry),
            admission,
            bus,
            Arc::new(MarkerProgressParser),
        );

        let first = exec
            .execute_in_background("sh", sh("sleep 5"), JobOptions::default())
            .await
            .unwrap();
        let second = exec
            .execute_in_background("sh", sh("exit 0"), JobOptions::default())
            .await
            .unwrap();

        assert_eq!(registry.get(&first).unwrap().status, JobStatus::Running);
        assert_eq!(registry.get(&second).unwrap().status, JobStatus::Queued);
        assert_eq!(registry.running_count_for("sh"), 1);

        assert!(registry.cancel(&first));
        let job = exec
            .wait_for_job(&second, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn freed_slot_goes_to_older_queued_job_first() {
        // "sh" limited to one running instance, plenty of global headroom.
        let registry = Arc::new(JobRegistry::new(50));
        let profiles = Arc::new(ProfileRegistry::with_overrides([
            drover_core::CommandProfile::new("sh", true, 1),
        ]));
        let admission = Arc::new(AdmissionController::new(profiles, 8));
        let bus = Arc::new(EventBus::new());
        let exec = ProcessExecutor::new(
            Arc::clone(&registry),
            admission,
            bus,
            Arc::new(MarkerProgressParser),
        );

        let first = exec
            .execute_in_background("sh", sh("sleep 30"), JobOptions::default())
            .await
            .unwrap();
        let older = exec
            .execute_in_background("sh", sh("sleep 0.2"), JobOptions::default())
            .await
            .unwrap();
        assert_eq!(registry.get(&older).unwrap().status, JobStatus::Queued);

        // Free the slot and submit a younger job in the same window, before
        // the detached supervisor has had a chance to promote anything.
        assert!(registry.cancel(&first));
        let younger = exec
            .execute_in_background("sh", sh("exit 0"), JobOptions::default())
            .await
            .unwrap();

        // The freed slot belongs to the older queued job, not the newcomer.
        assert_eq!(registry.get(&younger).unwrap().status, JobStatus::Queued);

        let older_job = exec.wait_for_job(&older, Duration::from_secs(5)).await.unwrap();
        let younger_job = exec
            .wait_for_job(&younger, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(older_job.status, JobStatus::Completed);
        assert_eq!(younger_job.status, JobStatus::Completed);
        assert!(older_job.started_at.unwrap() <= younger_job.started_at.unwrap());
    }
}
