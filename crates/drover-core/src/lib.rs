//! # drover-core
//!
//! Foundation types for the drover background command orchestrator:
//!
//! - [`ids::JobId`]: branded job identifier
//! - [`job::Job`] / [`job::JobStatus`]: tracked command invocations and
//!   their lifecycle state machine
//! - [`job::JobOptions`]: per-invocation option struct with an open
//!   extension map
//! - [`profile::CommandProfile`] / [`profile::ProfileRegistry`]: static
//!   backgrounding policy per command
//! - [`events::JobEvent`]: lifecycle events broadcast by the runtime
//! - [`resource::ResourceSnapshot`]: point-in-time resource usage
//!
//! This crate holds no async machinery; the runtime lives in
//! `drover-runtime`.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod job;
pub mod profile;
pub mod resource;

pub use events::JobEvent;
pub use ids::JobId;
pub use job::{Job, JobOptions, JobStatus};
pub use profile::{CommandProfile, ProfileRegistry};
pub use resource::ResourceSnapshot;
