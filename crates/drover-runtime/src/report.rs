//! Human-readable status reports.
//!
//! Plain text for terminal display. The section headers are part of the
//! observable contract and must not change.

use drover_core::{Job, JobStatus, ResourceSnapshot};

use crate::registry::JobRegistry;

/// Width of the per-job progress bar, characters between the brackets.
const BAR_WIDTH: usize = 10;

/// Render the full multi-section status report.
#[must_use]
pub fn generate_status_report(
    registry: &JobRegistry,
    snapshot: &ResourceSnapshot,
    effective_ceiling: usize,
    max_concurrent_jobs: usize,
) -> String {
    let mut out = String::new();
    out.push_str("Background Command Orchestrator Status\n");
    out.push_str("======================================\n\n");

    out.push_str("Resource Usage\n");
    out.push_str(&format!(
        "  Memory:      {:.1} MB\n",
        bytes_to_mb(snapshot.memory_bytes)
    ));
    out.push_str(&format!("  CPU:         {:.1}%\n", snapshot.cpu_percent));
    out.push_str(&format!(
        "  Active jobs: {} / {} (max {})\n",
        snapshot.active_jobs, effective_ceiling, max_concurrent_jobs
    ));
    out.push_str(&format!("  Total jobs:  {}\n\n", snapshot.total_jobs));

    out.push_str("Jobs\n");
    let jobs = registry.list();
    if jobs.is_empty() {
        out.push_str("  No jobs.\n");
    } else {
        for job in &jobs {
            out.push_str(&job_line(job));
        }
    }
    out
}

/// One report line for a job.
fn job_line(job: &Job) -> String {
    let duration = job
        .duration_ms()
        .map_or_else(|| "-".to_owned(), format_duration);
    let detail = match job.status {
        JobStatus::Failed => job.error.clone().unwrap_or_default(),
        _ => job.progress_message.clone(),
    };
    format!(
        "  {:<8} {:<10} {:<10} {} {:>3}%  {:<30} {}\n",
        job.id.as_str(),
        job.command,
        job.status.as_str(),
        create_progress_bar(job.progress_percent, BAR_WIDTH),
        job.progress_percent,
        detail,
        duration,
    )
}

/// Format a millisecond duration for humans.
///
/// Boundaries: `500 → "500ms"`, `5000 → "5.0s"`, `65000 → "1m 5s"`,
/// `3665000 → "1h 1m"`.
#[must_use]
pub fn format_duration(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        let tenths = ms / 100;
        format!("{}.{}s", tenths / 10, tenths % 10)
    } else if ms < 3_600_000 {
        let secs = ms / 1_000;
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        let mins = ms / 60_000;
        format!("{}h {}m", mins / 60, mins % 60)
    }
}

/// Render a bracketed ASCII progress bar with exactly `width` characters
/// between the brackets.
#[must_use]
pub fn create_progress_bar(percent: u8, width: usize) -> String {
    let percent = usize::from(percent.min(100));
    let filled = width * percent / 100;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(width - filled))
}

#[allow(clippy::cast_precision_loss)]
fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_core::JobOptions;

    #[test]
    fn duration_boundary_mapping() {
        assert_eq!(format_duration(500), "500ms");
        assert_eq!(format_duration(5000), "5.0s");
        assert_eq!(format_duration(65000), "1m 5s");
        assert_eq!(format_duration(3_665_000), "1h 1m");
    }

    #[test]
    fn duration_edges() {
        assert_eq!(format_duration(0), "0ms");
        assert_eq!(format_duration(999), "999ms");
        assert_eq!(format_duration(1000), "1.0s");
        assert_eq!(format_duration(59_900), "59.9s");
        assert_eq!(format_duration(60_000), "1m 0s");
        assert_eq!(format_duration(3_599_000), "59m 59s");
        assert_eq!(format_duration(3_600_000), "1h 0m");
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(create_progress_bar(0, 10), "[..........]");
        assert_eq!(create_progress_bar(40, 10), "[####......]");
        assert_eq!(create_progress_bar(100, 10), "[##########]");
    }

    #[test]
    fn progress_bar_width_is_exact() {
        for percent in [0u8, 33, 50, 99, 100] {
            for width in [1usize, 5, 10, 20] {
                let bar = create_progress_bar(percent, width);
                assert_eq!(bar.len(), width + 2, "percent={percent} width={width}");
                assert!(bar.starts_with('['));
                assert!(bar.ends_with(']'));
            }
        }
    }

    #[test]
    fn progress_bar_clamps_over_100() {
        assert_eq!(create_progress_bar(250, 4), "[####]");
    }

    #[test]
    fn report_contains_contract_headers() {
        let registry = JobRegistry::new(10);
        let snapshot = drover_core::ResourceSnapshot::empty();
        let report = generate_status_report(&registry, &snapshot, 4, 4);
        assert!(report.contains("Background Command Orchestrator Status"));
        assert!(report.contains("Resource Usage"));
        assert!(report.contains("No jobs."));
    }

    #[test]
    fn report_lists_each_job() {
        let registry = JobRegistry::new(10);
        let a = registry.create_job("store", vec![], JobOptions::default());
        let b = registry.create_job("sync", vec![], JobOptions::default());
        let _ = registry.mark_running(&a, Some(1));
        let _ = registry.update_progress(&a, 40, "storing");

        let snapshot = drover_core::ResourceSnapshot::empty();
        let report = generate_status_report(&registry, &snapshot, 4, 4);
        assert!(report.contains(a.as_str()));
        assert!(report.contains(b.as_str()));
        assert!(report.contains("running"));
        assert!(report.contains("queued"));
        assert!(report.contains("[####......]"));
        assert!(report.contains("storing"));
    }

    #[test]
    fn failed_job_line_shows_error() {
        let registry = JobRegistry::new(10);
        let id = registry.create_job("store", vec![], JobOptions::default());
        let _ = registry.mark_running(&id, Some(1));
        let _ = registry.mark_failed(&id, "disk full", Some(1));

        let snapshot = drover_core::ResourceSnapshot::empty();
        let report = generate_status_report(&registry, &snapshot, 4, 4);
        assert!(report.contains("disk full"));
    }
}
