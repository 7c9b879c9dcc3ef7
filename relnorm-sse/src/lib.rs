//! Incremental SSE (Server-Sent Events) parser
//!
//! Decodes the SSE wire format as bytes arrive and yields complete
//! [`SseEvent`]s. Built for solver progress streams, whose emitters send
//! named `progress`, `complete`, and `stream-error` events with JSON data,
//! but the parser itself follows the protocol and carries no solver
//! knowledge.
//!
//! Only `tracing` is pulled in (for warnings on undecodable bytes), so the
//! crate stays cheap to depend on from both clients and tests.

mod parser;

pub use parser::{SseEvent, SseParser};
