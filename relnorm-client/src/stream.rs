//! SSE progress stream for streamed compute passes
//!
//! Connects to the solver's `decompose-stream` endpoint for one job token,
//! parses the bytes via `relnorm_sse::SseParser`, and yields [`JobEvent`]s
//! in server emit order.
//!
//! A job stream is single-shot: there is no reconnect. `complete` and
//! `stream-error` are terminal and close the connection immediately; any
//! connection failure or server close before those surfaces as
//! `Disconnected`, which the caller treats as a failed pass.

use crate::config::SolverConfig;
use crate::wire::{CompleteEnvelope, DecomposeAllResponse, ProgressMessage};
use futures::{Stream, StreamExt};
use relnorm_sse::{SseEvent, SseParser};
use std::fmt::Debug;
use std::pin::Pin;

/// One event observed on a job's progress stream.
#[derive(Debug)]
pub enum JobEvent {
    /// Human-readable progress line.
    Progress(String),
    /// Terminal: the solver finished and delivered the group payload.
    Complete(Box<DecomposeAllResponse>),
    /// Terminal: the solver reported a failure for this job.
    StreamError(String),
    /// Terminal: the connection failed or closed before `complete`.
    Disconnected { reason: String },
}

/// Source of progress streams, keyed by job token.
pub trait ProgressSource: Debug + Send + Sync {
    fn subscribe(&self, token: &str) -> Pin<Box<dyn Stream<Item = JobEvent> + Send>>;
}

#[derive(Debug, thiserror::Error)]
pub enum StreamParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Parse a single raw SSE event into an optional [`JobEvent`].
///
/// Returns:
/// - `Ok(Some(..))` for recognized events
/// - `Ok(None)` for ignored events (keepalive / unknown names)
/// - `Err(..)` for malformed data on recognized events
pub fn parse_stream_event(event: &SseEvent) -> Result<Option<JobEvent>, StreamParseError> {
    match event.effective_type() {
        "progress" => {
            let msg: ProgressMessage = serde_json::from_str(&event.data)?;
            Ok(Some(JobEvent::Progress(msg.message)))
        }
        "complete" => {
            let envelope: CompleteEnvelope = serde_json::from_str(&event.data)?;
            Ok(Some(JobEvent::Complete(Box::new(envelope.payload))))
        }
        "stream-error" => {
            let msg: ProgressMessage = serde_json::from_str(&event.data)?;
            Ok(Some(JobEvent::StreamError(msg.message)))
        }
        _ => Ok(None),
    }
}

/// SSE-based progress source.
#[derive(Debug)]
pub struct SseProgressSource {
    stream_base: String,
}

impl SseProgressSource {
    /// `stream_base` is the stream endpoint URL without the token query,
    /// e.g. `http://localhost:8080/normalize/decompose-stream`.
    pub fn new(stream_base: impl Into<String>) -> Self {
        Self {
            stream_base: stream_base.into(),
        }
    }

    /// Stream endpoint derived from a solver config.
    pub fn for_config(config: &SolverConfig) -> Self {
        Self::new(format!("{}/decompose-stream", config.base_url()))
    }
}

impl ProgressSource for SseProgressSource {
    fn subscribe(&self, token: &str) -> Pin<Box<dyn Stream<Item = JobEvent> + Send>> {
        let url = format!(
            "{}?token={}",
            self.stream_base,
            urlencoding::encode(token),
        );

        let stream = async_stream::stream! {
            let client = reqwest::Client::new();
            let mut consecutive_parse_errors: usize = 0;
            const MAX_CONSECUTIVE_PARSE_ERRORS: usize = 25;

            let request = client.get(&url).header("Accept", "text/event-stream");

            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let mut parser = SseParser::new();
                    let mut byte_stream = resp.bytes_stream();

                    while let Some(chunk_result) = byte_stream.next().await {
                        match chunk_result {
                            Ok(bytes) => {
                                for event in parser.feed(&bytes) {
                                    match parse_stream_event(&event) {
                                        Ok(Some(job_event)) => {
                                            consecutive_parse_errors = 0;
                                            let terminal = matches!(
                                                job_event,
                                                JobEvent::Complete(_) | JobEvent::StreamError(_)
                                            );
                                            yield job_event;
                                            if terminal {
                                                return;
                                            }
                                        }
                                        Ok(None) => {
                                            // ignored event (keepalive / unknown type)
                                        }
                                        Err(e) => {
                                            consecutive_parse_errors += 1;
                                            tracing::warn!(
                                                error = %e,
                                                consecutive = consecutive_parse_errors,
                                                "Failed to parse solver stream event"
                                            );

                                            if consecutive_parse_errors >= MAX_CONSECUTIVE_PARSE_ERRORS {
                                                yield JobEvent::Disconnected {
                                                    reason: format!(
                                                        "Too many stream parse errors ({}): likely schema mismatch",
                                                        consecutive_parse_errors
                                                    ),
                                                };
                                                return;
                                            }
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                yield JobEvent::Disconnected {
                                    reason: format!("Stream error: {}", e),
                                };
                                return;
                            }
                        }
                    }

                    // Server closed without a terminal event.
                    yield JobEvent::Disconnected {
                        reason: "Stream ended before completion".to_string(),
                    };
                }
                Ok(resp) => {
                    yield JobEvent::Disconnected {
                        reason: format!("HTTP {}", resp.status()),
                    };
                }
                Err(e) => {
                    yield JobEvent::Disconnected {
                        reason: format!("Connection failed: {}", e),
                    };
                }
            }
        };

        Box::pin(stream)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(event_type: &str, data: &str) -> SseEvent {
        SseEvent {
            event_type: Some(event_type.to_string()),
            data: data.to_string(),
            id: None,
        }
    }

    #[test]
    fn test_parse_progress_event() {
        let event = raw_event(
            "progress",
            r#"{"message":"Decomposed Table 1: Starting computations."}"#,
        );
        match parse_stream_event(&event).unwrap() {
            Some(JobEvent::Progress(msg)) => {
                assert_eq!(msg, "Decomposed Table 1: Starting computations.");
            }
            other => panic!("expected Progress, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_complete_event() {
        let event = raw_event(
            "complete",
            r#"{"status":"done","payload":{"ljPreserved":true,"bcnfdecomposition":true}}"#,
        );
        match parse_stream_event(&event).unwrap() {
            Some(JobEvent::Complete(payload)) => {
                assert_eq!(payload.lj_preserved, Some(true));
                assert!(payload.bcnf_decomposition);
            }
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_stream_error_event() {
        let event = raw_event(
            "stream-error",
            r#"{"message":"Stream token is invalid or expired."}"#,
        );
        match parse_stream_event(&event).unwrap() {
            Some(JobEvent::StreamError(msg)) => {
                assert_eq!(msg, "Stream token is invalid or expired.");
            }
            other => panic!("expected StreamError, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_event_ignored() {
        let event = raw_event("keepalive", "{}");
        assert!(parse_stream_event(&event).unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_data_is_error() {
        let event = raw_event("progress", "not json");
        assert!(parse_stream_event(&event).is_err());
    }

    #[tokio::test]
    async fn test_subscribe_yields_events_in_order_and_stops_on_complete() {
        let server = wiremock::MockServer::start().await;

        let body = concat!(
            "event: progress\n",
            "data: {\"message\":\"Decomposed Table 1: Starting computations.\"}\n\n",
            "event: progress\n",
            "data: {\"message\":\"Decomposed Table 1: Completed in 12 ms.\"}\n\n",
            "event: complete\n",
            "data: {\"status\":\"done\",\"payload\":{\"ljPreserved\":true,\"bcnfdecomposition\":false}}\n\n",
        );

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/normalize/decompose-stream"))
            .and(wiremock::matchers::query_param("token", "job-1"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let source = SseProgressSource::new(format!("{}/normalize/decompose-stream", server.uri()));
        let events: Vec<JobEvent> = source.subscribe("job-1").collect().await;

        assert_eq!(events.len(), 3);
        match &events[0] {
            JobEvent::Progress(msg) => assert!(msg.contains("Starting computations")),
            other => panic!("expected Progress, got {:?}", other),
        }
        match &events[1] {
            JobEvent::Progress(msg) => assert!(msg.contains("Completed in")),
            other => panic!("expected Progress, got {:?}", other),
        }
        match &events[2] {
            JobEvent::Complete(payload) => assert_eq!(payload.lj_preserved, Some(true)),
            other => panic!("expected Complete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_stream_error_is_terminal() {
        let server = wiremock::MockServer::start().await;

        let body = concat!(
            "event: stream-error\n",
            "data: {\"message\":\"Stream token is invalid or expired.\"}\n\n",
            "event: progress\n",
            "data: {\"message\":\"never seen\"}\n\n",
        );

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/normalize/decompose-stream"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let source = SseProgressSource::new(format!("{}/normalize/decompose-stream", server.uri()));
        let events: Vec<JobEvent> = source.subscribe("bad-token").collect().await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::StreamError(msg) => {
                assert_eq!(msg, "Stream token is invalid or expired.");
            }
            other => panic!("expected StreamError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_close_without_complete_disconnects() {
        let server = wiremock::MockServer::start().await;

        let body = concat!(
            "event: progress\n",
            "data: {\"message\":\"partial\"}\n\n",
        );

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/normalize/decompose-stream"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
            )
            .mount(&server)
            .await;

        let source = SseProgressSource::new(format!("{}/normalize/decompose-stream", server.uri()));
        let events: Vec<JobEvent> = source.subscribe("job-2").collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], JobEvent::Progress(_)));
        match &events[1] {
            JobEvent::Disconnected { reason } => {
                assert!(reason.contains("Stream ended"));
            }
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_connection_failure_disconnects() {
        // Nothing listens on this port.
        let source = SseProgressSource::new("http://127.0.0.1:9/normalize/decompose-stream");
        let events: Vec<JobEvent> = source.subscribe("job-3").collect().await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], JobEvent::Disconnected { .. }));
    }

    #[tokio::test]
    async fn test_subscribe_http_error_disconnects() {
        let server = wiremock::MockServer::start().await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/normalize/decompose-stream"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = SseProgressSource::new(format!("{}/normalize/decompose-stream", server.uri()));
        let events: Vec<JobEvent> = source.subscribe("job-4").collect().await;

        assert_eq!(events.len(), 1);
        match &events[0] {
            JobEvent::Disconnected { reason } => assert!(reason.contains("500")),
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }
}
