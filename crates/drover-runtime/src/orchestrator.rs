//! Orchestrator facade.
//!
//! Owns the registry, admission controller, event bus, executor, and
//! resource monitor, and exposes the public surface callers use. Every
//! instance is fully independent — its own job map, its own bus, its own
//! monitor loop — so tests can construct as many as they like with no
//! cross-talk and no global reset step: dropping the orchestrator is the
//! reset.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use drover_core::{Job, JobEvent, JobId, JobOptions, ProfileRegistry, ResourceSnapshot};
use drover_settings::OrchestratorSettings;
use tokio::sync::broadcast;
use tracing::info;

use crate::admission::AdmissionController;
use crate::bus::{EventBus, JobWatch};
use crate::errors::OrchestratorError;
use crate::executor::ProcessExecutor;
use crate::monitor::ResourceMonitor;
use crate::progress::MarkerProgressParser;
use crate::registry::JobRegistry;
use crate::report;

/// The background command orchestrator.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    profiles: Arc<ProfileRegistry>,
    registry: Arc<JobRegistry>,
    admission: Arc<AdmissionController>,
    bus: Arc<EventBus>,
    executor: ProcessExecutor,
    monitor: Arc<ResourceMonitor>,
    shut_down: AtomicBool,
}

impl Orchestrator {
    /// Construct an orchestrator from settings and start its monitor loop.
    ///
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn new(settings: OrchestratorSettings) -> Self {
        let profiles = Arc::new(ProfileRegistry::with_overrides(
            settings.profiles.iter().cloned().map(Into::into),
        ));
        let registry = Arc::new(JobRegistry::new(settings.output_tail_lines));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&profiles),
            settings.max_concurrent_jobs,
        ));
        let bus = Arc::new(EventBus::new());
        let executor = ProcessExecutor::new(
            Arc::clone(&registry),
            Arc::clone(&admission),
            Arc::clone(&bus),
            Arc::new(MarkerProgressParser),
        );
        let monitor = Arc::new(ResourceMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&admission),
            settings.monitor.clone(),
        ));
        monitor.start(executor.clone());

        Self {
            settings,
            profiles,
            registry,
            admission,
            bus,
            executor,
            monitor,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Construct from a configuration directory (`settings.json` inside
    /// it, deep-merged over defaults, plus `DROVER_*` env overrides).
    pub fn from_config_dir(config_dir: Option<&Path>) -> Result<Self, OrchestratorError> {
        let settings = drover_settings::load_settings(config_dir)?;
        Ok(Self::new(settings))
    }

    /// The settings this orchestrator was built with.
    #[must_use]
    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// The command profile table.
    #[must_use]
    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Decide whether an invocation should run in the background.
    #[must_use]
    pub fn should_run_in_background(
        &self,
        command: &str,
        args: &[String],
        options: &JobOptions,
    ) -> bool {
        self.profiles.should_run_in_background(command, args, options)
    }

    /// Create and (if admitted) start a background job.
    ///
    /// See [`ProcessExecutor::execute_in_background`] for semantics.
    pub async fn execute_in_background(
        &self,
        command: &str,
        args: Vec<String>,
        options: JobOptions,
    ) -> Result<JobId, OrchestratorError> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ShutDown);
        }
        self.executor.execute_in_background(command, args, options).await
    }

    /// Start a background job and return a [`JobWatch`] over its events.
    ///
    /// The watch is subscribed before the job is created, so it sees the
    /// job's whole lifecycle from `JobStarted` on, with no gap for early
    /// progress to slip through.
    pub async fn execute_watched(
        &self,
        command: &str,
        args: Vec<String>,
        options: JobOptions,
    ) -> Result<(JobId, JobWatch), OrchestratorError> {
        let rx = self.bus.subscribe();
        let id = self.execute_in_background(command, args, options).await?;
        Ok((id.clone(), JobWatch::new(rx, id)))
    }

    /// Wait for a job to reach a terminal state, bounded by `timeout`.
    pub async fn wait_for_job(
        &self,
        id: &JobId,
        timeout: Duration,
    ) -> Result<Job, OrchestratorError> {
        self.executor.wait_for_job(id, timeout).await
    }

    /// Cancel a job. `false` if unknown or already terminal; never panics.
    pub fn cancel_job(&self, id: &JobId) -> bool {
        self.registry.cancel(id)
    }

    /// Snapshot of one job.
    #[must_use]
    pub fn get_job(&self, id: &JobId) -> Option<Job> {
        self.registry.get(id)
    }

    /// Snapshots of all known jobs.
    #[must_use]
    pub fn list_jobs(&self) -> Vec<Job> {
        self.registry.list()
    }

    /// Recent captured output lines for a job.
    #[must_use]
    pub fn job_output(&self, id: &JobId) -> Vec<String> {
        self.registry.output_tail(id)
    }

    /// Current resource usage (sampled on demand).
    #[must_use]
    pub fn resource_usage(&self) -> ResourceSnapshot {
        self.monitor.current_usage()
    }

    /// Statically configured global concurrency ceiling. Always positive.
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.admission.max_concurrent_jobs()
    }

    /// Current effective ceiling (may be lower under resource pressure).
    #[must_use]
    pub fn effective_ceiling(&self) -> usize {
        self.admission.effective_ceiling()
    }

    /// Subscribe to lifecycle events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }

    /// Render the status report.
    #[must_use]
    pub fn status_report(&self) -> String {
        report::generate_status_report(
            &self.registry,
            &self.monitor.current_usage(),
            self.effective_ceiling(),
            self.max_concurrent_jobs(),
        )
    }

    /// Shut down: cancel every non-terminal job, stop the monitor loop,
    /// and emit `Shutdown` exactly once. Safe to call repeatedly; only the
    /// first call does anything. Does not wait for processes to exit.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let cancelled = self
            .registry
            .non_terminal_ids()
            .into_iter()
            .filter(|id| self.registry.cancel(id))
            .count();
        info!(cancelled, "orchestrator shut down");
        self.monitor.stop();
        let _ = self.bus.emit(JobEvent::Shutdown);
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
