//! Live event stream over a long-lived HTTP response

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use hookwire_proto::{LiveEvent, SseDecoder};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::error::RelayError;

/// Three missed 15s keep-alives
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(45);

/// Wait for the stream's response headers
pub const DEFAULT_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<LiveEvent>,
    idle_timeout: Duration,
    // Only incoming bytes move this forward
    deadline: Instant,
    slug: Option<String>,
    finished: bool,
}

impl EventStream {
    pub(crate) fn new(response: reqwest::Response, slug: &str, idle_timeout: Duration) -> Self {
        Self::from_byte_stream(response.bytes_stream().boxed(), idle_timeout).for_slug(slug)
    }

    pub fn from_byte_stream(
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            body,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout,
            deadline: Instant::now() + idle_timeout,
            slug: None,
            finished: false,
        }
    }

    /// Slug reported by `EndpointDeleted` events whose payload names none
    pub fn for_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    /// Next known event; `Ok(None)` once the server closed the stream.
    ///
    /// Comments and unknown event kinds are skipped. Malformed payloads are
    /// logged and skipped so one bad record does not tear down the session.
    /// Cancel safe: no decoded event is lost if the future is dropped, and
    /// dropping it does not restart the idle timeout.
    pub async fn next_event(&mut self) -> Result<Option<LiveEvent>, RelayError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.finished {
                return Ok(None);
            }

            let chunk = tokio::time::timeout_at(self.deadline, self.body.next())
                .await
                .map_err(|_| {
                    RelayError::Stream(format!(
                        "no data for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })?;

            match chunk {
                Some(Ok(bytes)) => {
                    trace!(len = bytes.len(), "Stream chunk");
                    self.deadline = Instant::now() + self.idle_timeout;
                    let frames = self
                        .decoder
                        .feed(&bytes)
                        .map_err(|err| RelayError::Stream(err.to_string()))?;
                    self.queue(frames);
                }
                Some(Err(err)) => return Err(RelayError::Stream(err.to_string())),
                None => {
                    self.finished = true;
                    let last = self.decoder.finish();
                    self.queue(last);
                }
            }
        }
    }

    fn queue(&mut self, frames: impl IntoIterator<Item = hookwire_proto::SseFrame>) {
        for frame in frames {
            match LiveEvent::from_frame(&frame) {
                Ok(Some(LiveEvent::Comment)) | Ok(None) => {}
                Ok(Some(LiveEvent::EndpointDeleted { slug })) if slug.is_empty() => {
                    let slug = self.slug.clone().unwrap_or_default();
                    self.pending.push_back(LiveEvent::EndpointDeleted { slug });
                }
                Ok(Some(event)) => self.pending.push_back(event),
                Err(err) => warn!(error = %err, "Skipping malformed live event"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunks(parts: Vec<&'static str>) -> BoxStream<'static, reqwest::Result<Bytes>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from_static(p.as_bytes())))).boxed()
    }

    #[tokio::test]
    async fn test_events_across_chunks() {
        let body = chunks(vec![
            "event: endpoint_del",
            "eted\r",
            "\ndata: {\"slug\":\"x\"}\r\n",
            "\r\n: keepalive\n\n",
        ]);
        let mut stream = EventStream::from_byte_stream(body, DEFAULT_IDLE_TIMEOUT);

        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(LiveEvent::EndpointDeleted {
                slug: "x".to_string()
            })
        );
        assert_eq!(stream.next_event().await.unwrap(), None);
        assert_eq!(stream.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bad_payload_skipped() {
        let body = chunks(vec![
            "event: request\ndata: {broken\n\n",
            "event: endpoint_deleted\ndata: {\"slug\":\"y\"}",
        ]);
        let mut stream = EventStream::from_byte_stream(body, DEFAULT_IDLE_TIMEOUT);

        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(LiveEvent::EndpointDeleted {
                slug: "y".to_string()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_errors() {
        let body = stream::pending().boxed();
        let mut stream = EventStream::from_byte_stream(body, Duration::from_secs(45));

        let err = stream.next_event().await.unwrap_err();
        assert!(matches!(err, RelayError::Stream(_)));
    }

    #[tokio::test]
    async fn test_deleted_without_payload_uses_subscribed_slug() {
        let body = chunks(vec!["event: endpoint_deleted\ndata: {}\n\n"]);
        let mut stream = EventStream::from_byte_stream(body, DEFAULT_IDLE_TIMEOUT).for_slug("mine");
        assert_eq!(
            stream.next_event().await.unwrap(),
            Some(LiveEvent::EndpointDeleted {
                slug: "mine".to_string()
            })
        );

        let body = chunks(vec!["event: endpoint_deleted\n\n"]);
        let mut stream = EventStream::from_byte_stream(body, DEFAULT_IDLE_TIMEOUT);
        assert!(matches!(
            stream.next_event().await.unwrap(),
            Some(LiveEvent::EndpointDeleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_endless_line_is_a_stream_error() {
        let line = Bytes::from(vec![b'x'; 256 * 1024]);
        let body = stream::repeat_with(move || Ok::<_, reqwest::Error>(line.clone())).boxed();
        let mut stream = EventStream::from_byte_stream(body, DEFAULT_IDLE_TIMEOUT);

        let err = stream.next_event().await.unwrap_err();
        assert!(matches!(err, RelayError::Stream(ref msg) if msg.contains("exceeds")));
        assert!(!err.is_fatal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_deadline_survives_dropped_futures() {
        let body = stream::pending().boxed();
        let mut stream = EventStream::from_byte_stream(body, Duration::from_secs(45));
        let started = Instant::now();

        // Abandon the wait every 10s, the way a select loop does
        for _ in 0..4 {
            let abandoned = tokio::time::timeout(Duration::from_secs(10), stream.next_event()).await;
            assert!(abandoned.is_err());
        }

        let err = stream.next_event().await.unwrap_err();
        assert!(matches!(err, RelayError::Stream(_)));
        assert!(started.elapsed() < Duration::from_secs(46));
    }
}
