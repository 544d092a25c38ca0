//! Incremental reader for `text/event-stream` bodies.
//!
//! Turns a byte stream into the `data:` payloads of its events, one item per
//! event, as soon as the blank line that ends the event arrives.

use crate::protocol::extract_sse_data;
use futures::{Stream, StreamExt};
use std::pin::Pin;

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
}

const EVENT_ENDS: [&[u8]; 4] = [b"\r\n\r\n", b"\r\n\n", b"\n\r\n", b"\n\n"];

/// Position and length of the first blank line that ends an event. Bytes are
/// searched before decoding so a chunk boundary can fall anywhere, including
/// inside a multi-byte character or between `\r` and `\n`.
fn event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        EVENT_ENDS
            .into_iter()
            .find(|end| rest.starts_with(end))
            .map(|end| (i, end.len()))
    })
}

pub fn data_events<S, B, E>(bytes: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    futures::stream::unfold(
        SseState {
            bytes: Box::pin(bytes),
            buffer: Vec::new(),
        },
        |mut state| async move {
            loop {
                if let Some((idx, len)) = event_end(&state.buffer) {
                    let raw_event: Vec<u8> = state.buffer.drain(..idx + len).collect();
                    let raw_event = String::from_utf8_lossy(&raw_event[..idx]);

                    if let Some(data) = extract_sse_data(&raw_event) {
                        return Some((Ok(data), state));
                    }
                    // Comment or keep-alive.
                    continue;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => return Some((Err(e), state)),
                    None => {
                        let rest = std::mem::take(&mut state.buffer);
                        return extract_sse_data(&String::from_utf8_lossy(&rest))
                            .map(|data| (Ok(data), state));
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    async fn collect(chunks: Vec<&'static str>) -> Vec<String> {
        collect_bytes(chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect()).await
    }

    async fn collect_bytes(chunks: Vec<Vec<u8>>) -> Vec<String> {
        let bytes = futures::stream::iter(chunks.into_iter().map(Ok::<_, Infallible>));
        data_events(bytes)
            .map(|item| item.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn events_split_across_chunks() {
        let events = collect(vec!["data: {\"a\"", ":1}\n", "\ndata: 2\n\n"]).await;
        assert_eq!(events, vec!["{\"a\":1}", "2"]);
    }

    #[tokio::test]
    async fn named_events_and_comments() {
        let events = collect(vec![
            "event: ping\ndata: {}\n\n",
            ": keep-alive\n\n",
            "event: message_stop\r\ndata: {\"type\":\"message_stop\"}\r\n\r\n",
        ])
        .await;
        assert_eq!(events, vec!["{}", "{\"type\":\"message_stop\"}"]);
    }

    #[tokio::test]
    async fn trailing_event_without_blank_line() {
        let events = collect(vec!["data: last"]).await;
        assert_eq!(events, vec!["last"]);
    }

    #[tokio::test]
    async fn multibyte_character_split_across_chunks() {
        let frame = "data: {\"text\":\"café €\"}\n\n".as_bytes();
        let split = frame.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let events = collect_bytes(vec![frame[..split].to_vec(), frame[split..].to_vec()]).await;
        assert_eq!(events, vec!["{\"text\":\"café €\"}"]);
    }

    #[tokio::test]
    async fn crlf_boundary_split_between_chunks() {
        let events = collect(vec![
            "data: {\"a\":1}\r\n\r",
            "\ndata: {\"b\":2}\r\n\r\n",
        ])
        .await;
        assert_eq!(events, vec!["{\"a\":1}", "{\"b\":2}"]);
    }
}
