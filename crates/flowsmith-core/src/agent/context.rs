//! Per-run context
//!
//! Everything one request carries through the pipeline: its id, the
//! request-scoped cache, the cancellation token, the wall-clock deadline
//! and the event channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::cache::RunCache;
use super::events::ProgressEvent;

#[derive(Clone)]
pub struct RunContext {
    pub run_id: String,
    pub cache: Arc<RunCache>,
    pub cancel: CancellationToken,
    pub deadline: Instant,
    events: mpsc::UnboundedSender<ProgressEvent>,
}

impl RunContext {
    pub fn new(
        budget: Duration,
        max_failed_lookups_per_term: usize,
        cancel: CancellationToken,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            cache: Arc::new(RunCache::new(max_failed_lookups_per_term)),
            cancel,
            deadline: Instant::now() + budget,
            events,
        }
    }

    /// Send an event; a dropped receiver is not an error.
    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Checkpoint test: no new collaborator call should start.
    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.deadline_passed()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Per-call timeout, clipped to what is left of the run budget.
    pub fn call_timeout(&self, per_call: Duration) -> Duration {
        per_call.min(self.remaining())
    }
}
