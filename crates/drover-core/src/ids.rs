//! Branded job identifier.
//!
//! Job IDs are `job-<n>` where `n` comes from a monotonically increasing
//! counter owned by the job registry. The newtype keeps job IDs from being
//! confused with arbitrary strings at API boundaries, and the counter keeps
//! IDs ordered by creation so FIFO promotion can rely on them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier for one tracked job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build the ID for the `n`-th job created by a registry.
    #[must_use]
    pub fn from_number(n: u64) -> Self {
        Self(format!("job-{n}"))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for JobId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_number_formats() {
        assert_eq!(JobId::from_number(1).as_str(), "job-1");
        assert_eq!(JobId::from_number(42).as_str(), "job-42");
    }

    #[test]
    fn display_matches_inner() {
        let id = JobId::from_string("job-7".into());
        assert_eq!(id.to_string(), "job-7");
    }

    #[test]
    fn serde_transparent() {
        let id = JobId::from_number(3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"job-3\"");
        let back: JobId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
