//! # drover-runtime
//!
//! The background command orchestrator: decides nothing about *what*
//! commands do, only *where and when* they run.
//!
//! - [`bus::EventBus`]: broadcast channel for [`drover_core::JobEvent`]
//! - [`registry::JobRegistry`]: the single source of truth for job state
//! - [`admission::AdmissionController`]: global + per-command concurrency
//!   gating with FIFO promotion
//! - [`executor::ProcessExecutor`]: spawns and supervises OS processes,
//!   extracts `PROGRESS:` markers from stdout
//! - [`monitor::ResourceMonitor`]: periodic sysinfo sampling and
//!   pressure-based throttling of the effective ceiling
//! - [`report`]: human-readable status reports
//! - [`orchestrator::Orchestrator`]: the facade wiring it all together
//!
//! Construction is explicit: every [`orchestrator::Orchestrator`] is an
//! independent instance with its own registry, bus, and monitor, so tests
//! can run many side by side without cross-talk.

#![deny(unsafe_code)]

pub mod admission;
pub mod bus;
pub mod errors;
pub mod executor;
pub mod monitor;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod report;

pub use errors::OrchestratorError;
pub use orchestrator::Orchestrator;
