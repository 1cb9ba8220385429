//! Server-sent events decoding for the Responses API

use serde_json::Value;

/// Incremental SSE decoder. Bytes may split anywhere, including inside a
/// UTF-8 sequence; complete events come out as their joined `data:` payload.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
                    self.data.clear();
                }
            } else if let Some(payload) = line.strip_prefix("data:") {
                self.data.push(payload.trim_start().to_string());
            }
            // event:, id:, retry: and comments carry nothing we need;
            // the payload repeats the event type.
        }

        events
    }
}

#[derive(Debug, PartialEq)]
pub(crate) enum ResponsesEvent {
    TextDelta(String),
    Completed,
    Failed(String),
    Other,
}

pub(crate) fn parse_event(payload: &str) -> Result<ResponsesEvent, serde_json::Error> {
    if payload == "[DONE]" {
        return Ok(ResponsesEvent::Completed);
    }
    let json: Value = serde_json::from_str(payload)?;
    let event_type = json.get("type").and_then(|t| t.as_str()).unwrap_or("");

    Ok(match event_type {
        "response.output_text.delta" => match json.get("delta").and_then(|d| d.as_str()) {
            Some(delta) if !delta.is_empty() => ResponsesEvent::TextDelta(delta.to_string()),
            _ => ResponsesEvent::Other,
        },
        "response.completed" | "response.done" => ResponsesEvent::Completed,
        "response.failed" | "response.incomplete" | "error" => {
            ResponsesEvent::Failed(error_message(&json).unwrap_or_else(|| event_type.to_string()))
        }
        _ => ResponsesEvent::Other,
    })
}

fn error_message(json: &Value) -> Option<String> {
    json.get("error")
        .or_else(|| json.get("response").and_then(|r| r.get("error")))
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(|m| m.as_str().map(str::to_string))
        .or_else(|| {
            json.get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
}

/// Concatenate the `output_text` parts of a non-streaming response body.
pub(crate) fn collect_output_text(body: &Value) -> Option<String> {
    if let Some(text) = body.get("output_text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }

    let mut text = String::new();
    let mut found = false;
    for item in body.get("output")?.as_array()? {
        if item.get("type").and_then(|t| t.as_str()) != Some("message") {
            continue;
        }
        for part in item
            .get("content")
            .and_then(|c| c.as_array())
            .into_iter()
            .flatten()
        {
            if part.get("type").and_then(|t| t.as_str()) == Some("output_text") {
                if let Some(chunk) = part.get("text").and_then(|t| t.as_str()) {
                    text.push_str(chunk);
                    found = true;
                }
            }
        }
    }
    found.then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let raw = "event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"Hel\"}\n\n\
                   data: {\"type\":\"response.output_text.delta\",\"delta\":\"lo\"}\r\n\r\n";
        let (a, b) = raw.as_bytes().split_at(30);

        let mut events = decoder.push(a);
        assert!(events.is_empty());
        events.extend(decoder.push(b));
        assert_eq!(events.len(), 2);

        let deltas: Vec<_> = events
            .iter()
            .map(|e| parse_event(e).unwrap())
            .collect();
        assert_eq!(
            deltas,
            vec![
                ResponsesEvent::TextDelta("Hel".into()),
                ResponsesEvent::TextDelta("lo".into())
            ]
        );
    }

    #[test]
    fn keeps_multibyte_characters_split_between_chunks() {
        let mut decoder = SseDecoder::default();
        let raw = "data: {\"type\":\"response.output_text.delta\",\"delta\":\"café\"}\n\n".as_bytes();
        let split = raw.iter().position(|b| *b == 0xC3).unwrap() + 1;

        assert!(decoder.push(&raw[..split]).is_empty());
        let events = decoder.push(&raw[split..]);
        assert_eq!(
            parse_event(&events[0]).unwrap(),
            ResponsesEvent::TextDelta("café".into())
        );
    }

    #[test]
    fn parses_terminal_events() {
        assert_eq!(
            parse_event(r#"{"type":"response.completed","response":{}}"#).unwrap(),
            ResponsesEvent::Completed
        );
        assert_eq!(parse_event("[DONE]").unwrap(), ResponsesEvent::Completed);
        assert_eq!(
            parse_event(r#"{"type":"response.failed","response":{"error":{"message":"overloaded"}}}"#)
                .unwrap(),
            ResponsesEvent::Failed("overloaded".into())
        );
        assert!(parse_event("not json").is_err());
    }

    #[test]
    fn collects_message_output_text() {
        let body = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "Use the "},
                    {"type": "output_text", "text": "Slack piece."}
                ]}
            ]
        });
        assert_eq!(
            collect_output_text(&body).as_deref(),
            Some("Use the Slack piece.")
        );
        assert_eq!(collect_output_text(&json!({"output": []})), None);
    }
}
