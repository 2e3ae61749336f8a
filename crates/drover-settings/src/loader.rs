//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`OrchestratorSettings::default()`]
//! 2. If `<config_dir>/settings.json` exists, deep-merge user values over
//!    defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::OrchestratorSettings;

/// Resolve the settings file path inside a configuration directory, falling
/// back to `~/.drover` when no directory is supplied.
pub fn settings_path(config_dir: Option<&Path>) -> PathBuf {
    match config_dir {
        Some(dir) => dir.join("settings.json"),
        None => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".drover").join("settings.json")
        }
    }
}

/// Load settings for a configuration directory with env var overrides.
pub fn load_settings(config_dir: Option<&Path>) -> Result<OrchestratorSettings> {
    load_settings_from_path(&settings_path(config_dir))
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or invalid values, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<OrchestratorSettings> {
    let defaults = serde_json::to_value(OrchestratorSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: OrchestratorSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Each env var has strict parsing rules:
/// - Integers must be valid and within the specified range
/// - Invalid values are logged and ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut OrchestratorSettings) {
    if let Some(v) = read_env_usize("DROVER_MAX_JOBS", 1, 1_000) {
        settings.max_concurrent_jobs = v;
    }
    if let Some(v) = read_env_usize("DROVER_OUTPUT_TAIL_LINES", 1, 10_000) {
        settings.output_tail_lines = v;
    }
    if let Some(v) = read_env_u64("DROVER_SAMPLE_INTERVAL_MS", 100, 600_000) {
        settings.monitor.sample_interval_ms = v;
    }
    if let Some(v) = read_env_u64("DROVER_MEMORY_PRESSURE_MB", 16, 1_048_576) {
        settings.monitor.memory_pressure_mb = v;
    }
    if let Some(v) = read_env_u32("DROVER_PRESSURE_SAMPLES", 1, 100) {
        settings.monitor.pressure_sample_count = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_simple_override() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": 10});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 10);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({
            "monitor": {"sampleIntervalMs": 5000, "pressureSampleCount": 3}
        });
        let source = serde_json::json!({
            "monitor": {"sampleIntervalMs": 1000}
        });
        let merged = deep_merge(target, source);
        assert_eq!(merged["monitor"]["sampleIntervalMs"], 1000);
        assert_eq!(merged["monitor"]["pressureSampleCount"], 3);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"profiles": [1, 2, 3]});
        let source = serde_json::json!({"profiles": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["profiles"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
    }

    // ── parse helpers ───────────────────────────────────────────────

    #[test]
    fn parse_ranges_enforce_bounds() {
        assert_eq!(parse_usize_range("5", 1, 10), Some(5));
        assert_eq!(parse_usize_range("0", 1, 10), None);
        assert_eq!(parse_usize_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("abc", 1, 10), None);
        assert_eq!(parse_u32_range("3", 1, 100), Some(3));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.max_concurrent_jobs, 4);
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"maxConcurrentJobs": 2, "monitor": {{"sampleIntervalMs": 250}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.max_concurrent_jobs, 2);
        assert_eq!(settings.monitor.sample_interval_ms, 250);
        // untouched fields keep defaults
        assert_eq!(settings.monitor.pressure_sample_count, 3);
        assert_eq!(settings.output_tail_lines, 50);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn zero_ceiling_in_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"maxConcurrentJobs": 0}"#).unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn settings_path_uses_config_dir() {
        let path = settings_path(Some(std::path::Path::new("/etc/drover")));
        assert_eq!(path, PathBuf::from("/etc/drover/settings.json"));
    }

    #[test]
    fn profiles_parse_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"profiles": [{"name": "migrate", "autoBackground": true, "concurrencyLimit": 1}]}"#,
        )
        .unwrap();
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.profiles.len(), 1);
        assert_eq!(settings.profiles[0].name, "migrate");
    }
}
