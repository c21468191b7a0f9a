//! Server-sent events decoding (Bytes -> JSON Value)
//!
//! Frames are separated by a blank line; each `data:` line contributes to the
//! frame payload. Comment lines and non-JSON frames are skipped, and the
//! stream ends at `[DONE]`.

use crate::BoxStream;
use bytes::Bytes;
use futures::{stream, StreamExt};
use serde_json::Value;

const DELIMITER: &str = "\n\n";
const DONE_SIGNAL: &str = "[DONE]";

enum Frame {
    Data(Value),
    Done,
    Skip,
}

fn parse_frame(raw: &str) -> Frame {
    let mut payload = String::new();
    for line in raw.lines() {
        let line = line.trim_end();
        // Comment lines
        if line.starts_with(':') {
            continue;
        }
        let data = match line.strip_prefix("data:") {
            Some(rest) => rest.trim_start(),
            None if line.contains(':') && !line.trim_start().starts_with('{') => continue,
            None => line,
        };
        if !payload.is_empty() {
            payload.push('\n');
        }
        payload.push_str(data);
    }

    let payload = payload.trim();
    if payload.is_empty() {
        return Frame::Skip;
    }
    if payload == DONE_SIGNAL {
        return Frame::Done;
    }
    match serde_json::from_str(payload) {
        Ok(v) => Frame::Data(v),
        Err(e) => {
            tracing::debug!(error = %e, "skipping non-JSON SSE frame");
            Frame::Skip
        }
    }
}

/// Decode an SSE byte stream into one JSON value per `data` frame.
pub fn decode(input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
    // Incrementally buffer bytes and emit full frames split by the delimiter.
    let stream = stream::unfold(
        (input, String::new(), false),
        |(mut input, mut buf, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(idx) = buf.find(DELIMITER) {
                    let frame = buf[..idx].to_string();
                    buf.drain(..idx + DELIMITER.len());
                    match parse_frame(&frame) {
                        Frame::Data(v) => return Some((Ok(v), (input, buf, false))),
                        Frame::Done => return None,
                        Frame::Skip => continue,
                    }
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        if buf.contains('\r') {
                            buf = buf.replace("\r\n", "\n");
                        }
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf, true))),
                    None => {
                        // EOF: the last frame may lack its trailing blank line.
                        return match parse_frame(&buf) {
                            Frame::Data(v) => Some((Ok(v), (input, String::new(), true))),
                            Frame::Done | Frame::Skip => None,
                        };
                    }
                }
            }
        },
    );

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn chunks(parts: &[&'static str]) -> BoxStream<'static, Bytes> {
        let items: Vec<crate::Result<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn frames_split_across_chunks() {
        let input = chunks(&[
            ": keep-alive\n\ndata: {\"a\"",
            ":1}\r\n\r\ndata: {\"a\":2}\n\n",
            "data: [DONE]\n\ndata: {\"a\":3}\n\n",
        ]);
        let values: Vec<Value> = decode(input).try_collect().await.unwrap();
        assert_eq!(values, vec![serde_json::json!({"a":1}), serde_json::json!({"a":2})]);
    }

    #[tokio::test]
    async fn trailing_frame_without_delimiter() {
        let values: Vec<Value> = decode(chunks(&["data: {\"b\":true}"]))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(values, vec![serde_json::json!({"b":true})]);
    }
}
