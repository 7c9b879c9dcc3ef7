//! Wire payloads for the solver API
//!
//! One explicit schema per payload, parsed exactly once at the HTTP
//! boundary; nothing downstream branches on string-or-array shapes.
//!
//! Naming: the wire uses camelCase, but a few solver fields carry acronym
//! casing that `rename_all` cannot produce (`projectedFDs`, `missingFDs`)
//! and the BCNF flag arrives fully lowercased as `bcnfdecomposition`.
//! Those get explicit renames, with aliases for the spellings older solver
//! builds used.
//!
//! All indices in `columns`/`baseColumns`/`unionCols` are 0-based global
//! positions. FD clause strings and tuple text are the 1-based display
//! encoding (`"1,4->3"`, rows `;`-joined with `,`-joined cells).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Request body for `project-fds`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFdsRequest {
    pub columns: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation_id: Option<String>,
}

/// One decomposed table inside a `decompose-all` request.
///
/// The plain verdict call sends only `columns`/`manualData`/`fds`; the
/// streamed compute pass additionally carries the per-table solver budget.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecomposeTableEntry {
    pub columns: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fds: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_columns: Option<Vec<usize>>,
}

/// Request body for single-table `decompose`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecomposeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation_id: Option<String>,
    pub columns: Vec<usize>,
    pub manual_data: String,
    /// Semicolon-joined FD clauses in the table's local numbering.
    pub fds: String,
    pub time_limit: u32,
    pub monte_carlo: bool,
    pub samples: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_columns: Option<Vec<usize>>,
}

/// Request body for `decompose-all` and `decompose-stream/start`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecomposeAllRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation_id: Option<String>,
    pub tables: Vec<DecomposeTableEntry>,
    pub lossless_join: bool,
    pub dependency_preserve: bool,
    /// Global FD list, semicolon-joined.
    pub fds: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_columns: Option<Vec<usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monte_carlo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Response from single-table `decompose`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecomposeResponse {
    /// Per-cell RIC matrix aligned with the submitted unique rows.
    #[serde(alias = "ricMatrix")]
    pub ric: Option<Vec<Vec<f64>>>,
    /// Local-numbered FD clauses the solver derived for this table.
    #[serde(rename = "projectedFDs", alias = "projectedFds", alias = "fds")]
    pub projected_fds: Vec<String>,
    pub dp_preserved: Option<bool>,
    pub lj_preserved: Option<bool>,
}

/// Per-table lossless-join verdict detail.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LosslessJoinDetail {
    pub is_lossless: bool,
    pub explanation: String,
}

/// Response from `decompose-all` (also the streamed `complete` payload).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecomposeAllResponse {
    pub lj_preserved: Option<bool>,
    pub dp_preserved: Option<bool>,
    pub global_ric: Option<Vec<Vec<f64>>>,
    pub union_cols: Vec<usize>,
    pub table_results: Vec<DecomposeResponse>,
    #[serde(rename = "bcnfdecomposition", alias = "isBCNFDecomposition")]
    pub bcnf_decomposition: bool,
    pub missing_columns: Vec<usize>,
    #[serde(rename = "missingFDs", alias = "missingFds")]
    pub missing_fds: Vec<String>,
    pub global_manual_rows: Vec<Vec<String>>,
    pub lj_details: Vec<LosslessJoinDetail>,
}

/// Response from `decompose-stream/start`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartStreamResponse {
    pub token: String,
}

/// Response from `project-fds`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectFdsResponse {
    #[serde(rename = "projectedFDs", alias = "projectedFds", alias = "fds")]
    pub projected_fds: Vec<String>,
}

/// Error body the solver sends with 4xx rejections.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Navigation response from `continue` / `bcnf-review`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RedirectResponse {
    pub redirect_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Stream event payloads
// ---------------------------------------------------------------------------

/// Data payload of `progress` and `stream-error` events.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressMessage {
    pub message: String,
}

/// Data payload of the `complete` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompleteEnvelope {
    pub status: String,
    pub payload: DecomposeAllResponse,
}

// ---------------------------------------------------------------------------
// Persisted decomposition snapshots
// ---------------------------------------------------------------------------

/// Serialized decomposition state sent to `continue` / `bcnf-review` and
/// returned (JSON-encoded, most recent last) by the history endpoint.
///
/// Per-table FD lists travel as one semicolon-joined string per table;
/// absent RIC matrices are empty arrays, not null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnapshotPayload {
    pub columns_per_table: Vec<Vec<usize>>,
    pub manual_per_table: Vec<String>,
    pub fds_per_table: Vec<String>,
    pub fds_per_table_original: Vec<String>,
    pub ric_per_table: Vec<Vec<Vec<f64>>>,
    pub global_ric: Vec<Vec<f64>>,
    pub union_cols: Vec<usize>,
    pub original_table: String,
    pub original_ric: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<u64>,
}
