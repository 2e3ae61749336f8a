//! # drover-settings
//!
//! Configuration for the drover orchestrator, loaded from layered sources:
//!
//! 1. Compiled [`OrchestratorSettings::default()`]
//! 2. `<config_dir>/settings.json`, deep-merged over defaults
//! 3. Environment variable overrides (`DROVER_*`, highest priority)
//!
//! Invalid env values are logged and ignored so a typo never takes the
//! orchestrator down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{MonitorSettings, OrchestratorSettings, ProfileOverride};
