//! Admission control: who gets to run, and when.
//!
//! Two limits gate every start: the effective global ceiling (the
//! configured maximum, possibly lowered by the resource monitor under
//! pressure) and the per-command limit from the command's profile.
//!
//! Promotion is FIFO by creation order. A queued job is only passed over
//! in favor of a younger one when its own command is at its limit and the
//! younger job belongs to a different command.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use drover_core::{JobId, ProfileRegistry};

use crate::registry::JobRegistry;

/// Concurrency gate for job starts.
pub struct AdmissionController {
    profiles: Arc<ProfileRegistry>,
    /// Statically configured maximum. Always positive.
    max_concurrent_jobs: usize,
    /// Current effective ceiling, `1..=max_concurrent_jobs`.
    effective_ceiling: AtomicUsize,
}

impl AdmissionController {
    /// Create a controller with the configured global maximum.
    #[must_use]
    pub fn new(profiles: Arc<ProfileRegistry>, max_concurrent_jobs: usize) -> Self {
        let max = max_concurrent_jobs.max(1);
        Self {
            profiles,
            max_concurrent_jobs: max,
            effective_ceiling: AtomicUsize::new(max),
        }
    }

    /// The statically configured maximum (never changes, always positive).
    #[must_use]
    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// The current effective global ceiling.
    #[must_use]
    pub fn effective_ceiling(&self) -> usize {
        self.effective_ceiling.load(Ordering::Relaxed)
    }

    /// Set the effective ceiling (resource monitor only). Clamped to
    /// `1..=max_concurrent_jobs`.
    pub fn set_effective_ceiling(&self, ceiling: usize) {
        let clamped = ceiling.clamp(1, self.max_concurrent_jobs);
        self.effective_ceiling.store(clamped, Ordering::Relaxed);
    }

    /// Whether a new job for `command` may start right now.
    #[must_use]
    pub fn can_start(&self, registry: &JobRegistry, command: &str) -> bool {
        registry.running_count() < self.effective_ceiling()
            && registry.running_count_for(command) < self.profiles.concurrency_limit(command)
    }

    /// Queued jobs that may be promoted now, FIFO by creation order.
    ///
    /// Counts are simulated as the scan picks jobs, so the returned set
    /// never overshoots either limit. The scan stops once the global
    /// ceiling is reached; within it, a job blocked by its per-command
    /// limit is skipped without blocking younger jobs of other commands.
    #[must_use]
    pub fn promotable(&self, registry: &JobRegistry) -> Vec<JobId> {
        let ceiling = self.effective_ceiling();
        let mut global = registry.running_count();
        let mut picked = Vec::new();

        for job in registry.queued_fifo() {
            if global >= ceiling {
                break;
            }
            let limit = self.profiles.concurrency_limit(&job.command);
            let per_command = registry.running_count_for(&job.command)
                + picked_count_for(&picked, registry, &job.command);
            if per_command < limit {
                picked.push(job.id);
                global += 1;
            }
        }
        picked
    }
}

/// How many already-picked jobs belong to `command`.
fn picked_count_for(picked: &[JobId], registry: &JobRegistry, command: &str) -> usize {
    picked
        .iter()
        .filter(|id| {
            registry
                .get(id)
                .is_some_and(|job| job.command == command)
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::{CommandProfile, JobOptions};

    fn setup(max: usize) -> (AdmissionController, JobRegistry) {
        let profiles = Arc::new(ProfileRegistry::with_overrides([
            CommandProfile::new("store", true, 2),
            CommandProfile::new("sync", true, 1),
        ]));
        (AdmissionController::new(profiles, max), JobRegistry::new(10))
    }

    #[test]
    fn admits_under_both_limits() {
        let (admission, reg) = setup(4);
        assert!(admission.can_start(&reg, "store"));
    }

    #[test]
    fn per_command_limit_blocks() {
        let (admission, reg) = setup(4);
        for _ in 0..2 {
            let id = reg.create_job("store", vec![], JobOptions::default());
            let _ = reg.mark_running(&id, None);
        }
        assert!(!admission.can_start(&reg, "store"));
        assert!(admission.can_start(&reg, "sync"));
    }

    #[test]
    fn global_ceiling_blocks_everything() {
        let (admission, reg) = setup(2);
        for command in ["store", "sync"] {
            let id = reg.create_job(command, vec![], JobOptions::default());
            let _ = reg.mark_running(&id, None);
        }
        assert!(!admission.can_start(&reg, "store"));
        assert!(!admission.can_start(&reg, "export"));
    }

    #[test]
    fn ceiling_clamps_to_configured_max() {
        let (admission, _) = setup(4);
        admission.set_effective_ceiling(100);
        assert_eq!(admission.effective_ceiling(), 4);
        admission.set_effective_ceiling(0);
        assert_eq!(admission.effective_ceiling(), 1);
        assert_eq!(admission.max_concurrent_jobs(), 4);
    }

    #[test]
    fn promotes_fifo_within_limits() {
        let (admission, reg) = setup(4);
        let a = reg.create_job("store", vec![], JobOptions::default());
        let b = reg.create_job("store", vec![], JobOptions::default());
        let _skipped = reg.create_job("store", vec![], JobOptions::default());

        let picked = admission.promotable(&reg);
        // store limit is 2: oldest two picked, third skipped
        assert_eq!(picked, vec![a, b]);
    }

    #[test]
    fn skipped_command_does_not_block_others() {
        let (admission, reg) = setup(4);
        // sync already at its limit of 1
        let running = reg.create_job("sync", vec![], JobOptions::default());
        let _ = reg.mark_running(&running, None);

        let blocked = reg.create_job("sync", vec![], JobOptions::default());
        let younger = reg.create_job("store", vec![], JobOptions::default());

        let picked = admission.promotable(&reg);
        assert_eq!(picked, vec![younger]);
        assert_eq!(reg.get(&blocked).unwrap().status, drover_core::JobStatus::Queued);
    }

    #[test]
    fn promotion_respects_lowered_ceiling() {
        let (admission, reg) = setup(4);
        admission.set_effective_ceiling(1);
        let a = reg.create_job("store", vec![], JobOptions::default());
        let _b = reg.create_job("sync", vec![], JobOptions::default());

        let picked = admission.promotable(&reg);
        assert_eq!(picked, vec![a]);
    }

    #[test]
    fn unknown_commands_bounded_by_ceiling_only() {
        let (admission, reg) = setup(2);
        for _ in 0..5 {
            let _ = reg.create_job("list", vec![], JobOptions::default());
        }
        let picked = admission.promotable(&reg);
        assert_eq!(picked.len(), 2);
    }
}
