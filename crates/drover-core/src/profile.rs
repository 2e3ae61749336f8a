//! Command profiles and the backgrounding policy registry.
//!
//! A [`CommandProfile`] is static policy: whether a command defaults to
//! background execution and how many instances of it may run at once.
//! The [`ProfileRegistry`] is built once at orchestrator construction
//! (compiled defaults, optionally overridden from settings) and is never
//! mutated afterwards.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::job::JobOptions;

/// Backgrounding policy for one command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandProfile {
    /// Command name this profile applies to.
    pub name: String,
    /// Default placement when no explicit flag is given.
    pub auto_background: bool,
    /// Maximum simultaneous `Running` jobs for this command.
    pub concurrency_limit: usize,
}

impl CommandProfile {
    /// Convenience constructor.
    #[must_use]
    pub fn new(name: &str, auto_background: bool, concurrency_limit: usize) -> Self {
        Self {
            name: name.to_owned(),
            auto_background,
            concurrency_limit,
        }
    }
}

/// Immutable table of command profiles.
#[derive(Clone, Debug)]
pub struct ProfileRegistry {
    profiles: HashMap<String, CommandProfile>,
}

impl ProfileRegistry {
    /// Built-in profiles for the long-running commands shipped with the CLI.
    ///
    /// Commands not listed here default to foreground and are bounded only
    /// by the global concurrency ceiling.
    #[must_use]
    pub fn with_defaults() -> Self {
        let defaults = [
            CommandProfile::new("store", true, 2),
            CommandProfile::new("sync", true, 1),
            CommandProfile::new("backup", true, 1),
            CommandProfile::new("export", true, 2),
            CommandProfile::new("analyze", true, 2),
        ];
        Self {
            profiles: defaults
                .into_iter()
                .map(|p| (p.name.clone(), p))
                .collect(),
        }
    }

    /// Build from defaults plus per-command overrides (settings layer).
    ///
    /// An override with a known name replaces the built-in profile; an
    /// unknown name adds a new one.
    #[must_use]
    pub fn with_overrides(overrides: impl IntoIterator<Item = CommandProfile>) -> Self {
        let mut registry = Self::with_defaults();
        for profile in overrides {
            let _ = registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// Look up the profile for a command.
    #[must_use]
    pub fn get(&self, command: &str) -> Option<&CommandProfile> {
        self.profiles.get(command)
    }

    /// Per-command concurrency limit; unknown commands are unbounded
    /// (the global ceiling still applies).
    #[must_use]
    pub fn concurrency_limit(&self, command: &str) -> usize {
        self.get(command).map_or(usize::MAX, |p| p.concurrency_limit)
    }

    /// All profiles, for inspection and reporting.
    #[must_use]
    pub fn all(&self) -> Vec<&CommandProfile> {
        let mut profiles: Vec<_> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// Decide whether an invocation should run in the background.
    ///
    /// Explicit flags win over the profile default, and `foreground` wins
    /// when both flags are set. Unknown commands default to foreground.
    /// Pure: no side effects, args are accepted for future command-specific
    /// policy but not currently consulted.
    #[must_use]
    pub fn should_run_in_background(
        &self,
        command: &str,
        _args: &[String],
        options: &JobOptions,
    ) -> bool {
        if options.foreground {
            return false;
        }
        if options.background {
            return true;
        }
        self.get(command).is_some_and(|p| p.auto_background)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
