//! Solver client and session driver for relational normalization
//!
//! This crate connects the in-memory decomposition model from
//! `relnorm-core` to the BCNF solver service: request/response payloads,
//! the HTTP client, the streamed compute-job lifecycle, and the driver
//! that runs a group's check/lock/compute session end to end.
//!
//! # Architecture
//!
//! - [`config`]: Solver endpoint and compute-budget configuration
//! - [`wire`]: Request and response payloads for the solver API
//! - [`client`]: HTTP client implementing the [`SolverApi`] trait
//! - [`stream`]: Progress streams decoded from Server-Sent Events
//! - [`job`]: State machine for one streamed computation job
//! - [`driver`]: Session orchestration over state, client, and stream
//! - [`error`]: Error types for client operations
//!
//! # Dependencies
//!
//! This crate depends on `relnorm-core` for the decomposition model and
//! `relnorm-sse` for SSE parsing. It brings in `reqwest` for HTTP, so
//! consumers that only need the local model can skip it.

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod job;
pub mod stream;
pub mod wire;

pub use client::{HttpSolverClient, SolverApi};
pub use config::SolverConfig;
pub use driver::{CheckOutcome, ComputeOutcome, NormalizationDriver, UndoOutcome};
pub use error::{ClientError, Result};
pub use job::{ComputationJob, JobState};
pub use stream::{JobEvent, ProgressSource, SseProgressSource};
pub use wire::{
    DecomposeAllRequest, DecomposeAllResponse, DecomposeRequest, DecomposeResponse,
    DecomposeTableEntry, LosslessJoinDetail, ProjectFdsRequest, SnapshotPayload,
    StartStreamResponse,
};
