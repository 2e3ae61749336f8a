//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a settings file may specify any subset of fields — missing fields get
//! their production default during deserialization.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the drover orchestrator.
///
/// Loaded from `<config_dir>/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorSettings {
    /// Settings schema version.
    pub version: String,
    /// Statically configured global concurrency ceiling. Always positive;
    /// the resource monitor may lower the *effective* ceiling below this
    /// under pressure but never raises it above.
    pub max_concurrent_jobs: usize,
    /// Lines of stdout/stderr retained per job for failure diagnostics.
    pub output_tail_lines: usize,
    /// Resource monitor configuration.
    pub monitor: MonitorSettings,
    /// Command profile overrides applied over the built-in table.
    pub profiles: Vec<ProfileOverride>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_owned(),
            max_concurrent_jobs: 4,
            output_tail_lines: 50,
            monitor: MonitorSettings::default(),
            profiles: Vec::new(),
        }
    }
}

impl OrchestratorSettings {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(SettingsError::InvalidValue(
                "maxConcurrentJobs must be positive".to_owned(),
            ));
        }
        if self.monitor.sample_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "monitor.sampleIntervalMs must be positive".to_owned(),
            ));
        }
        if self.monitor.pressure_sample_count == 0 {
            return Err(SettingsError::InvalidValue(
                "monitor.pressureSampleCount must be positive".to_owned(),
            ));
        }
        for profile in &self.profiles {
            if profile.concurrency_limit == 0 {
                return Err(SettingsError::InvalidValue(format!(
                    "profile {} concurrencyLimit must be positive",
                    profile.name
                )));
            }
        }
        Ok(())
    }
}

/// Resource monitor settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    /// Sampling interval in milliseconds.
    pub sample_interval_ms: u64,
    /// Process memory above this many megabytes counts as pressure.
    pub memory_pressure_mb: u64,
    /// Process CPU above this percentage counts as pressure.
    pub cpu_pressure_percent: f32,
    /// Consecutive pressured (or calm) samples before the effective
    /// ceiling is lowered (or restored).
    pub pressure_sample_count: u32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 5_000,
            memory_pressure_mb: 1_536,
            cpu_pressure_percent: 85.0,
            pressure_sample_count: 3,
        }
    }
}

/// One command profile override from the settings file.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileOverride {
    /// Command name.
    pub name: String,
    /// Default placement when no explicit flag is given.
    #[serde(default)]
    pub auto_background: bool,
    /// Maximum simultaneous running jobs for this command.
    pub concurrency_limit: usize,
}

impl From<ProfileOverride> for drover_core::CommandProfile {
    fn from(p: ProfileOverride) -> Self {
        Self {
            name: p.name,
            auto_background: p.auto_background,
            concurrency_limit: p.concurrency_limit,
        }
    }
}
