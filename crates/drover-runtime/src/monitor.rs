//! Resource monitoring and pressure-based throttling.
//!
//! Samples the orchestrator process's memory and CPU with `sysinfo` on a
//! fixed interval, together with the registry's job counts. Sustained
//! pressure (consecutive samples over the configured thresholds) halves
//! the effective concurrency ceiling (floor 1); sustained calm restores
//! the configured maximum. Each tick also re-runs admission so queued
//! jobs are promoted even when no job happened to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;
use drover_core::ResourceSnapshot;
use drover_settings::MonitorSettings;
use parking_lot::Mutex;
use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::AdmissionController;
use crate::executor::ProcessExecutor;
use crate::registry::JobRegistry;

/// Periodic sampler and throttle for the effective concurrency ceiling.
pub struct ResourceMonitor {
    registry: Arc<JobRegistry>,
    admission: Arc<AdmissionController>,
    settings: MonitorSettings,
    system: Mutex<System>,
    pressure_streak: AtomicU32,
    calm_streak: AtomicU32,
    cancel: CancellationToken,
}

impl ResourceMonitor {
    /// Create a monitor over shared registry and admission state.
    #[must_use]
    pub fn new(
        registry: Arc<JobRegistry>,
        admission: Arc<AdmissionController>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            registry,
            admission,
            settings,
            system: Mutex::new(System::new_all()),
            pressure_streak: AtomicU32::new(0),
            calm_streak: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Take a fresh resource sample.
    ///
    /// Memory and CPU are for this process; unavailable values degrade to
    /// zero rather than failing, so a snapshot is always produced.
    #[must_use]
    pub fn sample(&self) -> ResourceSnapshot {
        let (memory_bytes, cpu_percent) = {
            let mut sys = self.system.lock();
            sys.refresh_all();
            match sysinfo::get_current_pid().ok().and_then(|pid| sys.process(pid)) {
                Some(proc) => (proc.memory(), proc.cpu_usage()),
                None => (0, 0.0),
            }
        };

        ResourceSnapshot {
            memory_bytes,
            cpu_percent,
            active_jobs: self.registry.running_count(),
            total_jobs: self.registry.total_count(),
            sampled_at: Utc::now(),
        }
    }

    /// Read-only usage query (samples on demand).
    #[must_use]
    pub fn current_usage(&self) -> ResourceSnapshot {
        self.sample()
    }

    /// Apply the throttling policy to one sample.
    ///
    /// Visible so tests can drive the policy with synthetic snapshots.
    pub fn adjust_ceiling(&self, snapshot: &ResourceSnapshot) {
        let memory_threshold = self.settings.memory_pressure_mb.saturating_mul(1024 * 1024);
        let pressured = snapshot.memory_bytes > memory_threshold
            || snapshot.cpu_percent > self.settings.cpu_pressure_percent;

        let max = self.admission.max_concurrent_jobs();
        if pressured {
            self.calm_streak.store(0, Ordering::Relaxed);
            let streak = self.pressure_streak.fetch_add(1, Ordering::Relaxed) + 1;
            let throttled = (max / 2).max(1);
            if streak >= self.settings.pressure_sample_count
                && self.admission.effective_ceiling() > throttled
            {
                warn!(
                    memory_bytes = snapshot.memory_bytes,
                    cpu_percent = snapshot.cpu_percent,
                    ceiling = throttled,
                    "sustained resource pressure, lowering concurrency ceiling"
                );
                self.admission.set_effective_ceiling(throttled);
            }
        } else {
            self.pressure_streak.store(0, Ordering::Relaxed);
            let streak = self.calm_streak.fetch_add(1, Ordering::Relaxed) + 1;
            if streak >= self.settings.pressure_sample_count
                && self.admission.effective_ceiling() < max
            {
                info!(ceiling = max, "resource pressure subsided, restoring ceiling");
                self.admission.set_effective_ceiling(max);
            }
        }
    }

    /// Start the periodic sampling loop.
    ///
    /// Each tick samples, adjusts the ceiling, and promotes queued jobs.
    /// The loop runs until [`stop`](Self::stop).
    pub fn start(self: &Arc<Self>, executor: ProcessExecutor) {
        let monitor = Arc::clone(self);
        let interval = std::time::Duration::from_millis(self.settings.sample_interval_ms);
        drop(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so startup isn't
            // counted as a sample.
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = monitor.sample();
                        debug!(
                            memory_bytes = snapshot.memory_bytes,
                            active_jobs = snapshot.active_jobs,
                            "resource sample"
                        );
                        monitor.adjust_ceiling(&snapshot);
                        executor.promote_queued().await;
                    }
                    () = monitor.cancel.cancelled() => break,
                }
            }
        }));
    }

    /// Stop the sampling loop. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}
