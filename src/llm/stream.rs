//! Line-oriented decoding of streamed HTTP bodies (NDJSON and SSE).

use futures_util::StreamExt;
use tokio::sync::mpsc;

use super::provider::TokenStream;
use crate::core::errors::RagError;

/// What one decoded line means for the answer stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
    Skip,
}

/// Splits a byte stream into complete lines. Network chunks may end in the
/// middle of a line or of a UTF-8 sequence, so bytes are held until `\n`.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Whatever trailed the last newline.
    pub fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

/// Pumps `response` through `parse` on a background task and hands back the
/// receiving end.
pub fn spawn_token_stream<F>(response: reqwest::Response, parse: F) -> TokenStream
where
    F: Fn(&str) -> Result<StreamEvent, RagError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(32);
    let mut stream = response.bytes_stream();

    tokio::spawn(async move {
        let mut buffer = LineBuffer::default();

        while let Some(item) = stream.next().await {
            match item {
                Ok(bytes) => {
                    for line in buffer.push(&bytes) {
                        match parse(&line) {
                            Ok(StreamEvent::Token(token)) => {
                                if tx.send(Ok(token)).await.is_err() {
                                    return;
                                }
                            }
                            Ok(StreamEvent::Done) => return,
                            Ok(StreamEvent::Skip) => {}
                            Err(err) => {
                                let _ = tx.send(Err(err)).await;
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(RagError::llm(e))).await;
                    return;
                }
            }
        }

        if let Some(line) = buffer.finish() {
            match parse(&line) {
                Ok(StreamEvent::Token(token)) => {
                    let _ = tx.send(Ok(token)).await;
                }
                Ok(_) => {}
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            }
        }
    });

    rx
}

/// Payload of an SSE `data:` line, if it is one.
pub fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"a\":").is_empty());
        assert_eq!(buffer.push(b"1}\n{\"b\""), vec!["{\"a\":1}".to_string()]);
        assert_eq!(buffer.push(b":2}\n\n"), vec!["{\"b\":2}".to_string()]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn split_multibyte_characters_survive() {
        let mut buffer = LineBuffer::default();
        let text = "pizza 🍕\n".as_bytes();
        let (head, tail) = text.split_at(8);
        assert!(buffer.push(head).is_empty());
        assert_eq!(buffer.push(tail), vec!["pizza 🍕".to_string()]);
    }

    #[test]
    fn trailing_partial_line_is_returned_on_finish() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"data: tail").is_empty());
        assert_eq!(buffer.finish(), Some("data: tail".to_string()));
    }

    #[test]
    fn sse_data_strips_the_prefix() {
        assert_eq!(sse_data("data: {\"x\":1}"), Some("{\"x\":1}"));
        assert_eq!(sse_data("data:[DONE]"), Some("[DONE]"));
        assert_eq!(sse_data(": keep-alive"), None);
    }
}
