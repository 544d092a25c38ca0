//! Bindings from a stream session to an HTTP response.
//!
//! The streaming binding serves long-lived ingress and writes each event as
//! it arrives. The bounded binding serves short-lived ingress and either does
//! the same under a tight budget or, when the caller cannot forward partial
//! responses, buffers every frame into one body.

use crate::config::FlushMode;
use crate::protocol::{WireEvent, encode_frame};
use crate::session::StreamSession;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

pub const EVENT_STREAM: &str = "text/event-stream";

pub trait Transport: Send + Sync {
    fn respond(&self, session: StreamSession) -> impl Future<Output = Response> + Send;
}

/// Long-timeout ingress with chunked delivery.
pub struct StreamingTransport {
    budget: Duration,
}

/// Short-timeout ingress.
pub struct BoundedTransport {
    budget: Duration,
    flush: FlushMode,
}

impl StreamingTransport {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

impl BoundedTransport {
    pub fn new(budget: Duration, flush: FlushMode) -> Self {
        Self { budget, flush }
    }
}

impl Transport for StreamingTransport {
    fn respond(&self, session: StreamSession) -> impl Future<Output = Response> + Send {
        let budget = self.budget;
        async move {
            tracing::debug!(session = %session.id(), "streaming response");
            Sse::new(sse_events(until_deadline(session, budget)))
                .keep_alive(
                    KeepAlive::new()
                        .interval(Duration::from_secs(15))
                        .text("keep-alive"),
                )
                .into_response()
        }
    }
}

impl Transport for BoundedTransport {
    fn respond(&self, session: StreamSession) -> impl Future<Output = Response> + Send {
        let budget = self.budget;
        let flush = self.flush;
        async move {
            match flush {
                FlushMode::Progressive => {
                    tracing::debug!(session = %session.id(), "bounded response, progressive");
                    Sse::new(sse_events(until_deadline(session, budget))).into_response()
                }
                FlushMode::Buffered => {
                    tracing::debug!(session = %session.id(), "bounded response, buffered");
                    let body: String = until_deadline(session, budget)
                        .map(|event| encode_frame(&event))
                        .collect()
                        .await;
                    ([(CONTENT_TYPE, EVENT_STREAM), (CACHE_CONTROL, "no-cache")], body)
                        .into_response()
                }
            }
        }
    }
}

fn sse_events(
    events: impl Stream<Item = WireEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    events.map(|event| Ok(Event::default().data(event.to_json())))
}

/// Drain `session` until its terminal event or until `budget` runs out, in
/// which case a timeout error ends the stream and the session is failed.
fn until_deadline(
    session: StreamSession,
    budget: Duration,
) -> impl Stream<Item = WireEvent> + Send + 'static {
    let deadline = Instant::now() + budget;
    futures::stream::unfold(Some(session), move |session| async move {
        let mut session = session?;
        match tokio::time::timeout_at(deadline, session.next_event()).await {
            Ok(Some(event)) => {
                let rest = if event.is_terminal() { None } else { Some(session) };
                Some((event, rest))
            }
            Ok(None) => None,
            Err(_) => {
                session.time_out();
                Some((WireEvent::timeout(), None))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentEngine, EngineEvent, EngineStream};
    use crate::protocol::decode_frames;
    use crate::session::SessionState;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct Scripted(Vec<EngineEvent>);

    impl AgentEngine for Scripted {
        fn run(self: Arc<Self>, _query: String, _cancel: CancellationToken) -> EngineStream {
            futures::stream::iter(self.0.clone().into_iter().map(Ok)).boxed()
        }
    }

    struct Stalls;

    impl AgentEngine for Stalls {
        fn run(self: Arc<Self>, _query: String, _cancel: CancellationToken) -> EngineStream {
            futures::stream::iter(vec![Ok(EngineEvent::Started)])
                .chain(futures::stream::pending())
                .boxed()
        }
    }

    fn answer() -> Arc<Scripted> {
        Arc::new(Scripted(vec![
            EngineEvent::Started,
            EngineEvent::Token("Amazon is up.".into()),
            EngineEvent::Finished,
        ]))
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn streaming_writes_every_event_as_a_frame() {
        let session = StreamSession::start(answer(), "q".into(), 4);
        let response = StreamingTransport::new(Duration::from_secs(5))
            .respond(session)
            .await;
        assert_eq!(response.headers()[CONTENT_TYPE], EVENT_STREAM);

        let events = decode_frames(&body_of(response).await);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], WireEvent::connected());
        assert_eq!(events[4], WireEvent::complete());
    }

    #[tokio::test]
    async fn buffered_body_is_exact_frames() {
        let session = StreamSession::start(answer(), "q".into(), 4);
        let response = BoundedTransport::new(Duration::from_secs(5), FlushMode::Buffered)
            .respond(session)
            .await;
        assert_eq!(response.headers()[CONTENT_TYPE], EVENT_STREAM);

        let body = body_of(response).await;
        let expected: String = [
            WireEvent::connected(),
            WireEvent::Content {
                text: "Amazon ".into(),
            },
            WireEvent::Content { text: "is ".into() },
            WireEvent::Content { text: "up.".into() },
            WireEvent::complete(),
        ]
        .iter()
        .map(encode_frame)
        .collect();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn buffered_run_that_stalls_ends_with_timeout() {
        let session = StreamSession::start(Arc::new(Stalls), "q".into(), 4);
        let mut handle = session.handle();
        let response = BoundedTransport::new(Duration::from_millis(100), FlushMode::Buffered)
            .respond(session)
            .await;

        let events = decode_frames(&body_of(response).await);
        assert_eq!(events, vec![WireEvent::connected(), WireEvent::timeout()]);
        assert_eq!(handle.terminal_state().await, SessionState::Failed);
        assert!(handle.is_cancel_requested());
    }

    #[tokio::test]
    async fn progressive_bounded_run_also_times_out() {
        let session = StreamSession::start(Arc::new(Stalls), "q".into(), 4);
        let response = BoundedTransport::new(Duration::from_millis(100), FlushMode::Progressive)
            .respond(session)
            .await;

        let events = decode_frames(&body_of(response).await);
        assert_eq!(events.last(), Some(&WireEvent::timeout()));
    }

    #[tokio::test]
    async fn streaming_run_past_its_budget_ends_with_timeout() {
        let session = StreamSession::start(Arc::new(Stalls), "q".into(), 4);
        let mut handle = session.handle();
        let response = StreamingTransport::new(Duration::from_millis(100))
            .respond(session)
            .await;

        let events = decode_frames(&body_of(response).await);
        assert_eq!(events, vec![WireEvent::connected(), WireEvent::timeout()]);
        assert_eq!(handle.terminal_state().await, SessionState::Failed);
        assert!(handle.is_cancel_requested());
    }
}
