//! Incremental consumer for the backend's `data: <json>` event stream.
//!
//! Bytes arrive in arbitrary ranges. They are decoded with [`Utf8Decoder`]
//! (which holds back a multi-byte character cut at a range boundary), split
//! into lines by [`EventLineBuffer`], and each `data: ` line is parsed into a
//! [`StreamPayload`]. Content increments are reported through a callback in
//! arrival order.

use std::time::Duration;

use futures::{Stream, StreamExt};

use crate::api::types::StreamPayload;
use crate::error::ApiError;

const DATA_PREFIX: &str = "data: ";

/// UTF-8 decoder that tolerates characters split across chunk boundaries
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (plus any held-back tail) as possible.
    /// Invalid sequences become U+FFFD; an incomplete trailing sequence is kept.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut out = String::new();
        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + len;
                        }
                        None => {
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..consumed);
        out
    }

    /// Flush whatever is still held back
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Splits decoded text into lines, carrying an unterminated tail forward
#[derive(Debug, Default)]
pub struct EventLineBuffer {
    partial: String,
}

impl EventLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text and return every line it completed, without terminators
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.partial.find('\n') {
            let mut line: String = self.partial.drain(..=newline_pos).collect();
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }
        lines
    }

    /// Return the unterminated tail, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let mut line = std::mem::take(&mut self.partial);
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }
}

/// Parse a single stream line; `None` for non-data lines and malformed JSON
pub fn parse_event_line(line: &str) -> Option<StreamPayload> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    match serde_json::from_str::<StreamPayload>(data) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::trace!("ignoring malformed stream line: {e}");
            None
        }
    }
}

/// Turns a chunked response body into content increments and a conversation id
#[derive(Debug, Default)]
pub struct StreamConsumer {
    decoder: Utf8Decoder,
    lines: EventLineBuffer,
    conversation_id: String,
    idle_timeout: Option<Duration>,
}

impl StreamConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with [`ApiError::Timeout`] if no bytes arrive within `limit`
    pub fn with_idle_timeout(mut self, limit: Duration) -> Self {
        self.idle_timeout = Some(limit);
        self
    }

    /// Feed one byte range, invoking `on_chunk(content, false)` per content line
    pub fn feed(&mut self, bytes: &[u8], on_chunk: &mut impl FnMut(&str, bool)) {
        let text = self.decoder.decode(bytes);
        for line in self.lines.push(&text) {
            self.handle_line(&line, on_chunk);
        }
    }

    /// Flush buffered input, emit the final callback, and return the conversation id
    pub fn finish(mut self, on_chunk: &mut impl FnMut(&str, bool)) -> String {
        let tail = self.decoder.finish();
        for line in self.lines.push(&tail) {
            self.handle_line(&line, on_chunk);
        }
        if let Some(line) = self.lines.finish() {
            self.handle_line(&line, on_chunk);
        }

        on_chunk("", true);
        self.conversation_id
    }

    fn handle_line(&mut self, line: &str, on_chunk: &mut impl FnMut(&str, bool)) {
        let Some(payload) = parse_event_line(line) else {
            return;
        };

        // Last write wins, including an empty id.
        if let Some(id) = payload.conversation_id {
            self.conversation_id = id;
        }

        if let Some(content) = payload.content.as_deref() {
            if !content.is_empty() {
                on_chunk(content, false);
            }
        }
    }

    /// Drive `stream` to completion.
    ///
    /// On a clean end of stream the final callback `on_chunk("", true)` fires
    /// exactly once and the last observed conversation id is returned (empty if
    /// none was seen). On a read error or idle timeout the error is returned and
    /// the final callback is not invoked.
    pub async fn consume<S, B, E, F>(mut self, mut stream: S, mut on_chunk: F) -> Result<String, ApiError>
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Into<ApiError>,
        F: FnMut(&str, bool),
    {
        loop {
            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| ApiError::Timeout(limit))?,
                None => stream.next().await,
            };

            let Some(item) = next else {
                break;
            };
            let bytes = item.map_err(Into::into)?;
            self.feed(bytes.as_ref(), &mut on_chunk);
        }

        Ok(self.finish(&mut on_chunk))
    }
}

/// Transient state of the reply currently being generated
#[derive(Debug, Clone, Default)]
pub struct StreamingState {
    /// Accumulated text buffer
    text_buffer: String,
    /// Whether a generation is in flight
    is_generating: bool,
    /// Number of increments received for the current generation
    chunk_count: usize,
}

impl StreamingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a generation as started with an empty buffer
    pub fn start(&mut self) {
        self.text_buffer.clear();
        self.chunk_count = 0;
        self.is_generating = true;
    }

    /// Append a text increment
    pub fn push_delta(&mut self, delta: &str) {
        if delta.is_empty() {
            return;
        }
        self.text_buffer.push_str(delta);
        self.chunk_count += 1;
    }

    /// Clear the buffer and the in-progress flag
    pub fn clear(&mut self) {
        self.text_buffer.clear();
        self.chunk_count = 0;
        self.is_generating = false;
    }

    pub fn is_generating(&self) -> bool {
        self.is_generating
    }

    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn has_content(&self) -> bool {
        !self.text_buffer.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(parts: &[&[u8]]) -> impl Stream<Item = Result<Vec<u8>, ApiError>> + Unpin {
        stream::iter(parts.iter().map(|p| Ok(p.to_vec())).collect::<Vec<_>>())
    }

    fn collect(parts: &[&[u8]]) -> (Vec<(String, bool)>, String) {
        let mut calls = Vec::new();
        let id = block_on(StreamConsumer::new().consume(body(parts), |text: &str, is_final| {
            calls.push((text.to_string(), is_final));
        }))
        .unwrap();
        (calls, id)
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    #[test]
    fn chunks_accumulate_and_final_fires_once() {
        let (calls, id) = collect(&[
            b"data: {\"conversation_id\":\"c-1\",\"content\":\"Hel\"}\n\n",
            b"data: {\"content\":\"lo\"}\n\ndata: {\"content\":\" world\"}\n\n",
        ]);

        let text: String = calls.iter().filter(|(_, f)| !f).map(|(t, _)| t.as_str()).collect();
        assert_eq!(text, "Hello world");
        assert_eq!(calls.iter().filter(|(_, f)| *f).count(), 1);
        assert_eq!(calls.last().unwrap(), &(String::new(), true));
        assert_eq!(id, "c-1");
    }

    #[test]
    fn multibyte_character_split_across_ranges() {
        let line = "data: {\"content\":\"caf\u{e9} \u{1F600}\"}\n".as_bytes();
        // Split inside the four-byte emoji and inside the two-byte e-acute.
        let emoji_start = line.len() - 7;
        let e_acute = line.iter().position(|&b| b == 0xC3).unwrap();
        let (calls, _) = collect(&[&line[..e_acute + 1], &line[e_acute + 1..emoji_start + 2], &line[emoji_start + 2..]]);

        assert_eq!(calls, vec![("caf\u{e9} \u{1F600}".to_string(), false), (String::new(), true)]);
    }

    #[test]
    fn line_split_across_ranges_is_reassembled() {
        let (calls, _) = collect(&[b"data: {\"cont", b"ent\":\"x\"}", b"\n"]);
        assert_eq!(calls[0], ("x".to_string(), false));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn last_conversation_id_wins_even_when_empty() {
        let (_, id) = collect(&[
            b"data: {\"conversation_id\":\"abc\",\"content\":\"a\"}\n",
            b"data: {\"conversation_id\":\"\"}\n",
        ]);
        assert_eq!(id, "");

        let (_, id) = collect(&[
            b"data: {\"conversation_id\":\"abc\"}\n",
            b"data: {\"conversation_id\":null,\"content\":\"b\"}\n",
        ]);
        assert_eq!(id, "abc");
    }

    #[test]
    fn ignores_noise_and_malformed_lines() {
        let (calls, id) = collect(&[
            b": keep-alive\n",
            b"event: message\n",
            b"data: not json\n",
            b"data:{\"content\":\"no space\"}\n",
            b"data: {\"content\": 42}\n",
            b"data: {\"content\":\"\",\"done\":true}\n",
            b"data: {\"content\":\"ok\"}\r\n",
        ]);
        assert_eq!(calls, vec![("ok".to_string(), false), (String::new(), true)]);
        assert_eq!(id, "");
    }

    #[test]
    fn unterminated_final_line_is_processed() {
        let (calls, id) = collect(&[b"data: {\"content\":\"tail\",\"conversation_id\":\"z\"}"]);
        assert_eq!(calls[0], ("tail".to_string(), false));
        assert_eq!(id, "z");
    }

    #[test]
    fn empty_stream_still_finishes() {
        let (calls, id) = collect(&[]);
        assert_eq!(calls, vec![(String::new(), true)]);
        assert_eq!(id, "");
    }

    #[tokio::test]
    async fn read_error_aborts_without_final_callback() {
        let parts: Vec<Result<Vec<u8>, ApiError>> = vec![
            Ok(b"data: {\"content\":\"partial\"}\n".to_vec()),
            Err(ApiError::Cancelled),
        ];
        let mut calls = Vec::new();
        let result = StreamConsumer::new().consume(stream::iter(parts), |text: &str, is_final| {
            calls.push((text.to_string(), is_final));
        })
        .await;

        assert!(matches!(result, Err(ApiError::Cancelled)));
        assert_eq!(calls, vec![("partial".to_string(), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_aborts_stream() {
        let stalled = stream::pending::<Result<Vec<u8>, ApiError>>();
        let result = StreamConsumer::new()
            .with_idle_timeout(Duration::from_secs(5))
            .consume(stalled, |_: &str, _| {})
            .await;
        assert!(matches!(result, Err(ApiError::Timeout(d)) if d == Duration::from_secs(5)));
    }

    #[test]
    fn decoder_replaces_invalid_bytes_and_holds_incomplete_tail() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xFF, b'b', 0xE2, 0x82]), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&[0xAC]), "\u{20AC}");
        assert_eq!(decoder.finish(), "");
        decoder.decode(&[0xF0, 0x9F]);
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[test]
    fn streaming_state_tracks_buffer() {
        let mut state = StreamingState::new();
        state.start();
        state.push_delta("first line\nsec");
        state.push_delta("");
        state.push_delta("ond");
        assert!(state.is_generating());
        assert_eq!(state.chunk_count(), 2);
        assert_eq!(state.text(), "first line\nsecond");

        state.clear();
        assert!(!state.is_generating());
        assert!(!state.has_content());
    }
}
