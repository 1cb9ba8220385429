//! Streaming API calls
//!
//! Turns the SSE byte stream into a stream of text deltas. A body that ends
//! without a terminal `response.completed` event is reported as an error so
//! the caller can fall back.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{ResponsesClient, COLLABORATOR};
use crate::ai::reasoning::{ReasoningLevel, Verbosity};
use crate::ai::sse::{parse_event, ResponsesEvent, SseDecoder};
use crate::ai::TextStream;
use crate::error::CollaboratorError;

struct DeltaStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, CollaboratorError>>,
    finished: bool,
    chunk_count: u64,
}

impl DeltaStream {
    fn absorb(&mut self, bytes: &[u8]) {
        for payload in self.decoder.push(bytes) {
            match parse_event(&payload) {
                Ok(ResponsesEvent::TextDelta(delta)) => self.pending.push_back(Ok(delta)),
                Ok(ResponsesEvent::Completed) => {
                    self.finished = true;
                    return;
                }
                Ok(ResponsesEvent::Failed(message)) => {
                    warn!(chunk = self.chunk_count, %message, "Response stream failed");
                    self.fail(CollaboratorError::unavailable(COLLABORATOR, message));
                    return;
                }
                Ok(ResponsesEvent::Other) => {}
                Err(e) => {
                    warn!(chunk = self.chunk_count, error = %e, "Response stream parse error");
                    self.fail(CollaboratorError::invalid(COLLABORATOR, e));
                    return;
                }
            }
        }
    }

    fn fail(&mut self, err: CollaboratorError) {
        self.pending.push_back(Err(err));
        self.finished = true;
    }
}

impl ResponsesClient {
    pub(super) async fn call_streaming(
        &self,
        prompt: &str,
        reasoning: ReasoningLevel,
        verbosity: Verbosity,
    ) -> Result<TextStream, CollaboratorError> {
        let body = self.request_body(prompt, reasoning, verbosity, true);
        let response = self.post(&body).await?;

        let state = DeltaStream {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::default(),
            pending: VecDeque::new(),
            finished: false,
            chunk_count: 0,
        };

        let deltas = stream::unfold(state, |mut st| async move {
            loop {
                if let Some(item) = st.pending.pop_front() {
                    return Some((item, st));
                }
                if st.finished {
                    debug!(chunks = st.chunk_count, "Response stream ended");
                    return None;
                }
                match st.body.next().await {
                    Some(Ok(bytes)) => {
                        st.chunk_count += 1;
                        st.absorb(&bytes);
                    }
                    Some(Err(e)) => {
                        warn!(chunk = st.chunk_count, error = %e, "Response stream read error");
                        st.fail(CollaboratorError::unavailable(COLLABORATOR, e));
                    }
                    None => st.fail(CollaboratorError::invalid(
                        COLLABORATOR,
                        "stream ended before completion",
                    )),
                }
            }
        });

        Ok(deltas.boxed())
    }
}
