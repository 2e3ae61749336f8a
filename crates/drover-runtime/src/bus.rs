//! Job event fan-out.
//!
//! One broadcast channel per orchestrator instance carries every
//! [`JobEvent`]. Subscribers either take the raw feed
//! ([`EventBus::subscribe`]) or a per-job view ([`EventBus::watch`]) that
//! filters to a single job and ends at shutdown. Emission never blocks: a
//! subscriber that falls behind misses events instead of stalling the
//! supervisors, and with no subscribers an event is simply not observed.

use drover_core::{JobEvent, JobId};
use tokio::sync::broadcast;

/// Events buffered per subscriber before a slow one starts missing them.
const CHANNEL_CAPACITY: usize = 1024;

/// Fan-out point for job lifecycle events.
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Broadcast one event; returns how many subscribers saw it.
    pub fn emit(&self, event: JobEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Raw feed of every event emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Feed of one job's events, ending at shutdown.
    #[must_use]
    pub fn watch(&self, id: JobId) -> JobWatch {
        JobWatch::new(self.tx.subscribe(), id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Filtered view of the event feed for a single job.
pub struct JobWatch {
    rx: broadcast::Receiver<JobEvent>,
    id: JobId,
}

impl JobWatch {
    pub(crate) fn new(rx: broadcast::Receiver<JobEvent>, id: JobId) -> Self {
        Self { rx, id }
    }

    /// Next event concerning the watched job.
    ///
    /// `None` once the orchestrator shuts down or the bus is gone. Lagging
    /// skips missed events rather than erroring.
    pub async fn next(&mut self) -> Option<JobEvent> {
        loop {
            match self.rx.recv().await {
                Ok(JobEvent::Shutdown) | Err(broadcast::error::RecvError::Closed) => return None,
                Ok(event) if event.job_id() == Some(&self.id) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    }
}
