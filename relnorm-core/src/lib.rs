//! # Relnorm Core
//!
//! Transport-agnostic decomposition model for relational-schema
//! normalization exercises.
//!
//! This crate provides:
//! - Core types: `Fd`, `DecompositionState`, `DecomposedTable`, `TableId`
//! - Global/local index mapping and FD projection onto column subsets
//! - Tuple deduplication with first-occurrence row links
//! - Column coverage checking and the decomposition lock state machine
//! - Snapshot history for undo
//!
//! ## Design Principles
//!
//! 1. **No transport here**: solver calls and event streams live in
//!    `relnorm-client`; this crate is pure state and arithmetic
//! 2. **Indices are 0-based internally**: the 1-based form exists only at
//!    the wire/display boundary (`Fd::parse_clause`, `Fd::to_wire`,
//!    `index::to_local`)
//! 3. **Malformed input degrades, never panics**: bad FD clauses, drag
//!    payloads, and snapshots are skipped or recovered with a warning
//!
//! ## Example
//!
//! ```ignore
//! use relnorm_core::{DecompositionState, Fd, project_all};
//!
//! let mut state = DecompositionState::new(vec![0, 1, 2, 3], rows);
//! let id = state.add_table_with_columns(vec![0, 3, 2])?;
//! let local = project_all(&group_fds, state.table(id).unwrap().columns());
//! ```

pub mod coverage;
pub mod dedupe;
pub mod error;
pub mod fd;
pub mod history;
pub mod index;
pub mod project;
pub mod session;
pub mod state;

// Re-export main types
pub use coverage::{check_coverage, CoverageReport};
pub use dedupe::{
    dedupe, format_manual_data, parse_manual_data, sanitize_manual_data, tuple_key, Dedup,
};
pub use error::{CoreError, Result};
pub use fd::{format_fd_list, parse_fd_list, Fd};
pub use history::{Snapshot, SnapshotHistory};
pub use index::{to_global, to_local};
pub use project::{project, project_all, to_local_wire};
pub use session::{format_duration_ms, SessionTracker};
pub use state::{
    AttachOutcome, DecomposedTable, DecompositionState, DetachOutcome, DragPayload, Phase,
    ReorderOutcome, TableId,
};
