//! Server-Sent Events framing: byte stream → line framing → JSON frame iterator.
//!
//! Generalizes the teacher SDK's `utils::parse_sse_stream`, which assumed each `bytes_stream`
//! item contained whole lines and only recognized the `data: ` prefix. This version retains a
//! partial trailing line across reads, splits on any run of CR/LF, skips `:`-prefixed comment
//! lines, accepts bare `{...}` lines as data, and flushes the buffered remainder when the
//! reader ends — per the framing rules in the specification.

use crate::error::{Error, Result};
use futures::Stream;
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::pin::Pin;

const DONE_MARKER: &str = "[DONE]";

/// Incremental line splitter that tolerates CR, LF, or CRLF runs and retains an incomplete
/// trailing line across calls to [`Framer::push`].
#[derive(Default)]
struct Framer {
    buf: String,
}

impl Framer {
    /// Feed new bytes in, draining complete lines out. Called once per network read.
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        self.drain_complete_lines()
    }

    /// Call when the underlying reader has ended: whatever remains in the buffer is flushed
    /// as a final line, so a stream with no trailing newline is not silently dropped.
    fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let Some(idx) = self.buf.find(['\n', '\r']) else {
                break;
            };
            let line = self.buf[..idx].to_string();
            let rest = &self.buf[idx..];
            // Skip the whole run of CR/LF bytes so CRLF and repeated blank lines collapse
            // to one split point, not an extra empty line per byte.
            let skip = rest
                .char_indices()
                .find(|(_, c)| *c != '\n' && *c != '\r')
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            self.buf = self.buf[idx + skip..].to_string();
            lines.push(line);
        }
        lines
    }
}

/// Parse one already-framed SSE line into a data payload, if it carries one.
///
/// Returns `None` for blank lines, `:`-prefixed comments, and anything else not recognized as
/// a data frame.
fn extract_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(':') {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("data: ") {
        return Some(rest);
    }
    if let Some(rest) = trimmed.strip_prefix("data:") {
        return Some(rest.trim_start());
    }
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    None
}

type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send>>;

struct ParserState {
    byte_stream: ByteStream,
    framer: Framer,
    pending_lines: VecDeque<String>,
    reader_done: bool,
    terminated: bool,
}

/// Parse a streaming HTTP response body into a lazy sequence of JSON frames of type `T`.
///
/// Parse failures on an individual payload drop that payload rather than aborting the stream
/// (providers occasionally emit heartbeat/keepalive frames that are not valid JSON for `T`).
/// The `[DONE]` sentinel terminates the sequence gracefully. The underlying reader is dropped
/// (and thus released) on every exit path, including early consumer termination, because it
/// lives inside `ParserState` which is dropped along with the stream.
pub fn parse_sse_stream<T>(response: reqwest::Response) -> Pin<Box<dyn Stream<Item = Result<T>> + Send>>
where
    T: DeserializeOwned + Send + 'static,
{
    use futures::StreamExt;

    let state = ParserState {
        byte_stream: Box::pin(response.bytes_stream()),
        framer: Framer::default(),
        pending_lines: VecDeque::new(),
        reader_done: false,
        terminated: false,
    };

    Box::pin(futures::stream::unfold(state, move |mut state| async move {
        loop {
            if state.terminated {
                return None;
            }

            // Drain any already-framed lines before reading more bytes.
            while let Some(line) = state.pending_lines.pop_front() {
                let Some(data) = extract_data(&line) else {
                    continue;
                };
                if data == DONE_MARKER {
                    state.terminated = true;
                    return None;
                }
                match serde_json::from_str::<T>(data) {
                    Ok(value) => return Some((Ok(value), state)),
                    Err(_) => continue, // drop malformed/heartbeat frame, keep streaming
                }
            }

            if state.reader_done {
                state.terminated = true;
                return None;
            }

            match state.byte_stream.next().await {
                Some(Ok(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let lines = state.framer.push(&text);
                    state.pending_lines.extend(lines);
                }
                Some(Err(e)) => {
                    state.terminated = true;
                    return Some((Err(Error::from(e)), state));
                }
                None => {
                    if let Some(last) = state.framer.flush() {
                        state.pending_lines.push_back(last);
                    }
                    state.reader_done = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Frame {
        v: u32,
    }

    fn framer_lines(inputs: &[&str]) -> Vec<String> {
        let mut framer = Framer::default();
        let mut out = Vec::new();
        for input in inputs {
            out.extend(framer.push(input));
        }
        if let Some(last) = framer.flush() {
            out.push(last);
        }
        out
    }

    #[test]
    fn test_framer_splits_lf() {
        let lines = framer_lines(&["data: {\"v\":1}\ndata: {\"v\":2}\n"]);
        assert_eq!(lines, vec!["data: {\"v\":1}", "data: {\"v\":2}"]);
    }

    #[test]
    fn test_framer_splits_crlf() {
        let lines = framer_lines(&["data: {\"v\":1}\r\ndata: {\"v\":2}\r\n"]);
        assert_eq!(lines, vec!["data: {\"v\":1}", "data: {\"v\":2}"]);
    }

    #[test]
    fn test_framer_retains_partial_line_across_reads() {
        let lines = framer_lines(&["data: {\"v\":", "1}\n"]);
        assert_eq!(lines, vec!["data: {\"v\":1}"]);
    }

    #[test]
    fn test_framer_flushes_trailing_line_without_newline() {
        let lines = framer_lines(&["data: {\"v\":1}"]);
        assert_eq!(lines, vec!["data: {\"v\":1}"]);
    }

    #[test]
    fn test_extract_data_skips_comments_and_blank() {
        assert_eq!(extract_data(":heartbeat"), None);
        assert_eq!(extract_data(""), None);
        assert_eq!(extract_data("data: {\"v\":1}"), Some("{\"v\":1}"));
        assert_eq!(extract_data("{\"v\":1}"), Some("{\"v\":1}"));
        assert_eq!(extract_data("event: message"), None);
    }

    #[tokio::test]
    async fn test_parse_sse_stream_skips_done_and_malformed() {
        // Build a response from a raw body via a local mock is out of scope for a unit test
        // without a server; instead exercise the framer + extract_data pipeline directly,
        // which is the part `parse_sse_stream` delegates to frame-by-frame.
        let lines = framer_lines(&[
            ":keepalive\n",
            "data: {\"v\":1}\n",
            "data: not json\n",
            "data: {\"v\":2}\n",
            "data: [DONE]\n",
        ]);
        let mut parsed = Vec::new();
        for line in &lines {
            if let Some(data) = extract_data(line) {
                if data == DONE_MARKER {
                    break;
                }
                if let Ok(frame) = serde_json::from_str::<Frame>(data) {
                    parsed.push(frame);
                }
            }
        }
        assert_eq!(parsed, vec![Frame { v: 1 }, Frame { v: 2 }]);
    }
}
