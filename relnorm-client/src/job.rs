//! Computation job state machine
//!
//! Tracks one streamed compute pass from token issue to terminal state:
//! `Created -> Streaming -> Completed | Failed`. Jobs are never reused; a
//! new pass gets a new job. Stream events are applied strictly in arrival
//! order, and the progress log survives a failure for display.

use crate::stream::{JobEvent, ProgressSource};
use crate::wire::DecomposeAllResponse;
use futures::StreamExt;
use tracing::warn;

/// Lifecycle of one streamed compute pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Token issued, no stream activity observed yet.
    Created,
    /// Progress events arriving.
    Streaming,
    /// Terminal: payload delivered.
    Completed,
    /// Terminal: stream error or disconnect before completion.
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One streamed compute pass.
#[derive(Debug)]
pub struct ComputationJob {
    token: String,
    state: JobState,
    progress_log: Vec<String>,
    result: Option<Box<DecomposeAllResponse>>,
    failure: Option<String>,
}

impl ComputationJob {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            state: JobState::Created,
            progress_log: Vec::new(),
            result: None,
            failure: None,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Progress lines in arrival order.
    pub fn progress_log(&self) -> &[String] {
        &self.progress_log
    }

    pub fn result(&self) -> Option<&DecomposeAllResponse> {
        self.result.as_deref()
    }

    /// Failure reason for a `Failed` job.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Move the payload out of a completed job.
    pub fn take_result(&mut self) -> Option<Box<DecomposeAllResponse>> {
        self.result.take()
    }

    /// Apply one stream event.
    ///
    /// Events arriving after a terminal state are dropped with a warning;
    /// a terminal verdict is never overwritten.
    pub fn apply(&mut self, event: JobEvent) {
        if self.state.is_terminal() {
            warn!(token = %self.token, event = ?event, "event after terminal job state, ignoring");
            return;
        }
        match event {
            JobEvent::Progress(message) => {
                self.state = JobState::Streaming;
                self.progress_log.push(message);
            }
            JobEvent::Complete(payload) => {
                self.state = JobState::Completed;
                self.result = Some(payload);
            }
            JobEvent::StreamError(message) => {
                self.state = JobState::Failed;
                self.failure = Some(message);
            }
            JobEvent::Disconnected { reason } => {
                self.state = JobState::Failed;
                self.failure = Some(reason);
            }
        }
    }

    /// Drive this job to a terminal state by consuming its progress stream.
    pub async fn run(&mut self, source: &dyn ProgressSource) {
        let mut stream = source.subscribe(&self.token);
        while let Some(event) = stream.next().await {
            self.apply(event);
            if self.state.is_terminal() {
                break;
            }
        }
        if !self.state.is_terminal() {
            self.state = JobState::Failed;
            self.failure = Some("Progress stream ended without completing".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::Stream;
    use std::pin::Pin;
    use std::sync::Mutex;

    /// Replays a scripted event sequence for one subscribe call.
    #[derive(Debug)]
    struct ScriptedSource {
        events: Mutex<Vec<JobEvent>>,
    }

    impl ScriptedSource {
        fn new(events: Vec<JobEvent>) -> Self {
            Self {
                events: Mutex::new(events),
            }
        }
    }

    impl ProgressSource for ScriptedSource {
        fn subscribe(&self, _token: &str) -> Pin<Box<dyn Stream<Item = JobEvent> + Send>> {
            let events = std::mem::take(&mut *self.events.lock().unwrap());
            Box::pin(futures::stream::iter(events))
        }
    }

    fn complete_event() -> JobEvent {
        JobEvent::Complete(Box::new(DecomposeAllResponse {
            lj_preserved: Some(true),
            ..Default::default()
        }))
    }

    #[test]
    fn test_progress_then_complete_preserves_order() {
        let mut job = ComputationJob::new("job-1");
        assert_eq!(job.state(), JobState::Created);

        job.apply(JobEvent::Progress("a".to_string()));
        assert_eq!(job.state(), JobState::Streaming);
        job.apply(JobEvent::Progress("b".to_string()));
        job.apply(complete_event());

        assert_eq!(job.progress_log(), &["a".to_string(), "b".to_string()]);
        assert_eq!(job.state(), JobState::Completed);
        assert!(job.result().is_some());
    }

    #[test]
    fn test_events_after_terminal_are_ignored() {
        let mut job = ComputationJob::new("job-2");
        job.apply(complete_event());
        assert_eq!(job.state(), JobState::Completed);

        job.apply(JobEvent::StreamError("late error".to_string()));
        job.apply(JobEvent::Progress("late progress".to_string()));

        assert_eq!(job.state(), JobState::Completed);
        assert!(job.progress_log().is_empty());
        assert!(job.failure().is_none());
    }

    #[test]
    fn test_stream_error_keeps_partial_log_discards_result() {
        let mut job = ComputationJob::new("job-3");
        job.apply(JobEvent::Progress("step 1".to_string()));
        job.apply(JobEvent::StreamError("solver failed".to_string()));

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.progress_log(), &["step 1".to_string()]);
        assert_eq!(job.failure(), Some("solver failed"));
        assert!(job.result().is_none());
    }

    #[test]
    fn test_disconnect_fails_the_job() {
        let mut job = ComputationJob::new("job-4");
        job.apply(JobEvent::Disconnected {
            reason: "Stream ended before completion".to_string(),
        });
        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.failure(), Some("Stream ended before completion"));
    }

    #[tokio::test]
    async fn test_run_consumes_stream_to_completion() {
        let source = ScriptedSource::new(vec![
            JobEvent::Progress("a".to_string()),
            JobEvent::Progress("b".to_string()),
            complete_event(),
        ]);

        let mut job = ComputationJob::new("job-5");
        job.run(&source).await;

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.progress_log(), &["a".to_string(), "b".to_string()]);
        assert_eq!(job.take_result().unwrap().lj_preserved, Some(true));
    }

    #[tokio::test]
    async fn test_run_fails_when_stream_ends_silently() {
        let source = ScriptedSource::new(vec![JobEvent::Progress("only".to_string())]);

        let mut job = ComputationJob::new("job-6");
        job.run(&source).await;

        assert_eq!(job.state(), JobState::Failed);
        assert_eq!(job.progress_log(), &["only".to_string()]);
        assert!(job.failure().unwrap().contains("without completing"));
    }
}
