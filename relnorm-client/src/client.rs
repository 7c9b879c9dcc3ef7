//! Remote solver client
//!
//! Abstraction over the normalization solver's HTTP endpoints. The solver
//! owns every verdict (lossless join, dependency preservation, BCNF, RIC);
//! this client only shapes requests, surfaces rejection messages, and
//! parses responses into the `wire` schemas.

use crate::config::SolverConfig;
use crate::error::{ClientError, Result};
use crate::wire::{
    DecomposeAllRequest, DecomposeAllResponse, DecomposeRequest, DecomposeResponse, ErrorBody,
    ProjectFdsRequest, ProjectFdsResponse, RedirectResponse, SnapshotPayload, StartStreamResponse,
};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::debug;

/// Client for the remote normalization solver.
#[async_trait]
pub trait SolverApi: Debug + Send + Sync {
    /// Project the session's FD set onto a column subset; returns FD
    /// clauses in the subset's local numbering.
    async fn project_fds(&self, req: &ProjectFdsRequest) -> Result<Vec<String>>;

    /// Single-table check and RIC computation.
    async fn decompose(&self, req: &DecomposeRequest) -> Result<DecomposeResponse>;

    /// Group-level verdict over the whole decomposition.
    async fn decompose_all(&self, req: &DecomposeAllRequest) -> Result<DecomposeAllResponse>;

    /// Start a streamed compute pass; returns the stream token.
    async fn start_stream(&self, req: &DecomposeAllRequest) -> Result<String>;

    /// Persist the accepted state and advance to the next stage.
    /// Returns the navigation target when the server supplies one.
    async fn advance_stage(&self, payload: &SnapshotPayload) -> Result<Option<String>>;

    /// Submit the final decomposition for BCNF review.
    async fn submit_bcnf_review(&self, payload: &SnapshotPayload) -> Result<Option<String>>;

    /// Fetch persisted snapshots as JSON-encoded strings, most recent last.
    async fn fetch_history(&self) -> Result<Vec<String>>;
}

/// HTTP-based solver client.
#[derive(Debug)]
pub struct HttpSolverClient {
    config: SolverConfig,
    http: reqwest::Client,
}

impl HttpSolverClient {
    /// Create a client for the configured solver.
    ///
    /// Redirects are not followed: `continue`/`bcnf-review` answer with a
    /// redirect whose target belongs to the embedding navigation layer.
    pub fn new(config: SolverConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// URL of the progress stream for a job token.
    pub fn stream_url(&self, token: &str) -> String {
        format!(
            "{}/decompose-stream?token={}",
            self.config.base_url(),
            urlencoding::encode(token),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url(), path)
    }
}

/// Build a `Remote` error from a non-success response, preferring the
/// solver's own `{"error": ...}` message over the raw body.
fn remote_failure(what: &str, status: u16, url: &str, body: &str) -> ClientError {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return ClientError::Remote(format!("{what} rejected with status {status}: {}", parsed.error));
    }
    if body.trim().is_empty() {
        ClientError::Remote(format!("{what} failed with status {status} for {url}"))
    } else {
        ClientError::Remote(format!("{what} failed with status {status} for {url}: {body}"))
    }
}

/// Shared redirect-or-json handling for the navigation endpoints.
async fn navigation_result(what: &str, url: &str, resp: reqwest::Response) -> Result<Option<String>> {
    match resp.status().as_u16() {
        200 => {
            let parsed: Option<RedirectResponse> = resp.json().await.ok();
            Ok(parsed.and_then(|r| r.redirect_url))
        }
        301 | 302 | 303 | 307 | 308 => {
            let target = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            Ok(target)
        }
        status => {
            let body = resp.text().await.unwrap_or_default();
            Err(remote_failure(what, status, url, &body))
        }
    }
}

#[async_trait]
impl SolverApi for HttpSolverClient {
    async fn project_fds(&self, req: &ProjectFdsRequest) -> Result<Vec<String>> {
        let url = self.url("project-fds");
        debug!(url = %url, columns = ?req.columns, "projecting FDs");
        let resp = self.http.post(&url).json(req).send().await?;

        match resp.status().as_u16() {
            200 => {
                let parsed: ProjectFdsResponse = resp.json().await?;
                Ok(parsed.projected_fds)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(remote_failure("FD projection", status, &url, &body))
            }
        }
    }

    async fn decompose(&self, req: &DecomposeRequest) -> Result<DecomposeResponse> {
        let url = self.url("decompose");
        debug!(url = %url, columns = ?req.columns, "single-table decompose");
        let resp = self.http.post(&url).json(req).send().await?;

        match resp.status().as_u16() {
            200 => {
                let parsed: DecomposeResponse = resp.json().await?;
                Ok(parsed)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(remote_failure("Decompose", status, &url, &body))
            }
        }
    }

    async fn decompose_all(&self, req: &DecomposeAllRequest) -> Result<DecomposeAllResponse> {
        let url = self.url("decompose-all");
        debug!(url = %url, tables = req.tables.len(), "group decompose check");
        let resp = self.http.post(&url).json(req).send().await?;

        match resp.status().as_u16() {
            200 => {
                let parsed: DecomposeAllResponse = resp.json().await?;
                Ok(parsed)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(remote_failure("Decomposition check", status, &url, &body))
            }
        }
    }

    async fn start_stream(&self, req: &DecomposeAllRequest) -> Result<String> {
        let url = self.url("decompose-stream/start");
        debug!(url = %url, tables = req.tables.len(), "starting streamed compute pass");
        let resp = self.http.post(&url).json(req).send().await?;

        match resp.status().as_u16() {
            200 => {
                let parsed: StartStreamResponse = resp.json().await?;
                Ok(parsed.token)
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(remote_failure("Stream start", status, &url, &body))
            }
        }
    }

    async fn advance_stage(&self, payload: &SnapshotPayload) -> Result<Option<String>> {
        let url = self.url("continue");
        debug!(url = %url, tables = payload.columns_per_table.len(), "advancing stage");
        let resp = self.http.post(&url).json(payload).send().await?;
        navigation_result("Stage advance", &url, resp).await
    }

    async fn submit_bcnf_review(&self, payload: &SnapshotPayload) -> Result<Option<String>> {
        let url = self.url("bcnf-review");
        debug!(url = %url, "submitting BCNF review");
        let resp = self.http.post(&url).json(payload).send().await?;
        navigation_result("BCNF review", &url, resp).await
    }

    async fn fetch_history(&self) -> Result<Vec<String>> {
        let url = self.url("history");
        debug!(url = %url, "fetching persisted snapshots");
        let resp = self.http.get(&url).send().await?;

        match resp.status().as_u16() {
            200 => {
                let snapshots: Vec<String> = resp.json().await?;
                Ok(snapshots)
            }
            404 => Ok(Vec::new()),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(remote_failure("History fetch", status, &url, &body))
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
