//! Stream accumulation for guide generation.
//!
//! Accumulates model deltas and turns them into `StreamingUpdate` events,
//! at most one per minimum interval, with a final flush. The deltas of all
//! emitted updates concatenate to `text_so_far`.

use std::time::Duration;

use tokio::time::Instant;

use super::events::ProgressEvent;

pub struct StreamState {
    pub text_so_far: String,
    pub chunk_count: usize,
    started: Instant,
    last_emit_time: Option<Instant>,
    /// Text appended since the last emitted update
    pending_delta: String,
    min_interval: Duration,
}

impl StreamState {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            text_so_far: String::new(),
            chunk_count: 0,
            started: Instant::now(),
            last_emit_time: None,
            pending_delta: String::new(),
            min_interval,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn word_count(&self) -> usize {
        self.text_so_far.split_whitespace().count()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_delta.is_empty()
    }

    /// Append one chunk. Returns an update when the throttle allows one.
    pub fn push(&mut self, chunk: &str) -> Option<ProgressEvent> {
        if chunk.is_empty() {
            return None;
        }
        self.chunk_count += 1;
        self.text_so_far.push_str(chunk);
        self.pending_delta.push_str(chunk);

        let now = Instant::now();
        let due = self
            .last_emit_time
            .map_or(true, |last| now.duration_since(last) >= self.min_interval);
        due.then(|| self.take_update(now))
    }

    /// Emit whatever is still pending, regardless of the throttle.
    pub fn flush(&mut self) -> Option<ProgressEvent> {
        self.has_pending().then(|| self.take_update(Instant::now()))
    }

    fn take_update(&mut self, now: Instant) -> ProgressEvent {
        self.last_emit_time = Some(now);
        ProgressEvent::StreamingUpdate {
            delta: std::mem::take(&mut self.pending_delta),
            cumulative_chars: self.text_so_far.chars().count(),
            cumulative_words: self.word_count(),
            elapsed: self.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(event: &ProgressEvent) -> &str {
        match event {
            ProgressEvent::StreamingUpdate { delta, .. } => delta,
            other => panic!("not a streaming update: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttles_and_flushes() {
        let mut state = StreamState::new(Duration::from_millis(500));
        let mut emitted = Vec::new();

        emitted.extend(state.push("Step one. "));
        assert!(state.push("Add a ").is_none());
        tokio::time::advance(Duration::from_millis(600)).await;
        emitted.extend(state.push("trigger."));
        assert!(state.flush().is_none());
        assert!(state.push(" Done").is_none());
        emitted.extend(state.flush());

        let deltas: Vec<&str> = emitted.iter().map(delta).collect();
        assert_eq!(deltas, vec!["Step one. ", "Add a trigger.", " Done"]);
        assert_eq!(deltas.concat(), state.text_so_far);
        assert_eq!(state.chunk_count, 4);

        match emitted.last() {
            Some(ProgressEvent::StreamingUpdate {
                cumulative_chars,
                cumulative_words,
                ..
            }) => {
                assert_eq!(*cumulative_chars, state.text_so_far.len());
                assert_eq!(*cumulative_words, 6);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_chunks_are_ignored() {
        let mut state = StreamState::new(Duration::ZERO);
        assert!(state.push("").is_none());
        assert_eq!(state.chunk_count, 0);
        assert!(state.flush().is_none());
    }
}
