//! Normalization driver
//!
//! Orchestrates one group's decomposition exercise: local pruning and
//! coverage checks, the solver's lossless-join verdict, the editable/locked
//! phase transition, and the streamed compute pass that annotates every
//! table with verified FDs and RIC matrices.
//!
//! The driver owns the [`DecompositionState`] and talks to the solver only
//! through the [`SolverApi`] and [`ProgressSource`] traits, so tests can
//! script both sides without a server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use relnorm_core::{
    check_coverage, format_duration_ms, format_fd_list, format_manual_data, parse_fd_list,
    project, project_all, CoreError, DecompositionState, Fd, SessionTracker, Snapshot,
    SnapshotHistory, TableId,
};
use tracing::{debug, info, warn};

use crate::client::SolverApi;
use crate::config::SolverConfig;
use crate::error::{ClientError, Result};
use crate::job::{ComputationJob, JobState};
use crate::stream::ProgressSource;
use crate::wire::{
    DecomposeAllRequest, DecomposeAllResponse, DecomposeRequest, DecomposeResponse,
    DecomposeTableEntry, ProjectFdsRequest, SnapshotPayload,
};

/// Result of a decomposition check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The group has not decomposed anything yet; nothing was sent.
    NoTables {
        /// User-facing message.
        message: String,
    },
    /// The union of assigned columns misses part of the base relation;
    /// nothing was sent.
    CoverageMissing {
        /// User-facing message listing the missing columns (1-based).
        message: String,
        /// Subset tables removed before the check.
        warnings: Vec<String>,
    },
    /// The solver rejected the decomposition as lossy. The state stays
    /// editable.
    NotLossless {
        /// Solver explanation for the first lossy table, when given.
        explanation: Option<String>,
        /// Subset tables removed before the check.
        warnings: Vec<String>,
    },
    /// The decomposition is lossless; the state is now locked.
    Locked {
        /// Whether the decomposition also preserves every dependency.
        /// `false` is a warning, not a rejection.
        dp_preserved: bool,
        /// FD clauses lost by the decomposition when `dp_preserved` is
        /// `false`.
        missing_fds: Vec<String>,
        /// Subset tables removed before the check.
        warnings: Vec<String>,
    },
}

/// Result of a compute pass over the locked decomposition.
#[derive(Debug)]
pub enum ComputeOutcome {
    /// Another pass is still running for this driver; nothing was sent.
    AlreadyRunning,
    /// Every table is in BCNF; the exercise is solved.
    BcnfReached {
        /// Check attempts the group needed.
        attempts: u64,
        /// Seconds since the first check.
        elapsed_secs: u64,
    },
    /// The decomposition is lossless but not yet BCNF; the group keeps
    /// decomposing.
    ContinueNormalization,
}

/// Result of an undo request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The previous layout was restored; the state is editable again.
    Restored,
    /// The history stack was empty; nothing changed.
    NothingToRestore,
}

/// Releases the in-flight flag when the compute pass future is dropped.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives one group's normalization session against a solver.
#[derive(Debug)]
pub struct NormalizationDriver {
    state: DecompositionState,
    history: SnapshotHistory,
    session: SessionTracker,
    config: SolverConfig,
    api: Arc<dyn SolverApi>,
    progress: Arc<dyn ProgressSource>,
    /// Global FD set over the base relation, 0-based indices.
    fds: Vec<Fd>,
    /// Group-level RIC from the latest accepted compute pass.
    global_ric: Option<Vec<Vec<f64>>>,
    /// Column mapping for the union view; identity until the solver says
    /// otherwise.
    union_cols: Vec<usize>,
    /// Rows of the union view when the solver rebuilt them.
    union_rows: Vec<Vec<String>>,
    /// Streamed progress messages from the latest compute pass.
    progress_log: Vec<String>,
    in_flight: Arc<AtomicBool>,
}

impl NormalizationDriver {
    pub fn new(
        config: SolverConfig,
        api: Arc<dyn SolverApi>,
        progress: Arc<dyn ProgressSource>,
        base_columns: Vec<usize>,
        base_rows: Vec<Vec<String>>,
        fds: Vec<Fd>,
    ) -> Self {
        let union_cols = (0..base_columns.len()).collect();
        NormalizationDriver {
            state: DecompositionState::new(base_columns, base_rows),
            history: SnapshotHistory::new(),
            session: SessionTracker::new(),
            config,
            api,
            progress,
            fds,
            global_ric: None,
            union_cols,
            union_rows: Vec::new(),
            progress_log: Vec::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The decomposition model.
    pub fn state(&self) -> &DecompositionState {
        &self.state
    }

    /// Mutable access for layout edits (attach, detach, reorder, add,
    /// remove). The state itself rejects edits while locked.
    pub fn state_mut(&mut self) -> &mut DecompositionState {
        &mut self.state
    }

    /// The undo stack, most recent snapshot last.
    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    /// Attempt and elapsed-time tracking for this session.
    pub fn session(&self) -> &SessionTracker {
        &self.session
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The global FD set this session works against.
    pub fn fds(&self) -> &[Fd] {
        &self.fds
    }

    /// Group-level RIC from the latest compute pass, if any ran.
    pub fn global_ric(&self) -> Option<&Vec<Vec<f64>>> {
        self.global_ric.as_ref()
    }

    /// Union-view column mapping from the latest compute pass.
    pub fn union_cols(&self) -> &[usize] {
        &self.union_cols
    }

    /// Union-view rows from the latest compute pass; empty until the solver
    /// rebuilds them.
    pub fn union_rows(&self) -> &[Vec<String>] {
        &self.union_rows
    }

    /// Progress messages streamed during the latest compute pass.
    pub fn progress_log(&self) -> &[String] {
        &self.progress_log
    }

    /// Session elapsed time formatted for display (`"950 ms"`, `"2.50 s"`).
    pub fn elapsed_display(&self) -> String {
        format_duration_ms(self.session.elapsed().as_millis() as u64)
    }

    /// Whether a compute pass is currently running.
    pub fn compute_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Check and lock
    // -----------------------------------------------------------------------

    /// Validate the current decomposition and lock it if the solver accepts.
    ///
    /// Local gates run first: subset tables are pruned, then column coverage
    /// is checked; failing either returns without a solver call. Otherwise
    /// the full decomposition goes to the solver for a lossless-join
    /// verdict. A lossy verdict leaves the state editable. An accepted
    /// verdict snapshots the layout onto the undo stack, locks the state,
    /// and annotates every table with its projected FDs. A dependency-
    /// preservation failure is reported but does not block the lock.
    pub async fn check_and_lock(&mut self) -> Result<CheckOutcome> {
        if self.state.is_locked() {
            return Err(ClientError::State(
                "decomposition is already locked; change it before checking again".to_string(),
            ));
        }
        if self.state.table_count() == 0 {
            return Ok(CheckOutcome::NoTables {
                message: "Error: No decomposed tables exist yet.".to_string(),
            });
        }

        let warnings = self.state.prune_subset_tables()?;
        for warning in &warnings {
            info!(warning = %warning, "pruned a redundant table");
        }

        let report = check_coverage(&self.state.column_sets(), self.state.base_columns());
        if !report.valid {
            let labels: Vec<String> = report
                .missing_labels()
                .iter()
                .map(usize::to_string)
                .collect();
            let message = format!(
                "Error: The following columns are missing: {}.",
                labels.join(", ")
            );
            return Ok(CheckOutcome::CoverageMissing { message, warnings });
        }

        // Every check that reaches the solver counts as an attempt; the
        // clock starts on the first one.
        if self.session.attempts() == 0 {
            self.session.start();
        }
        self.session.record_attempt();

        let request = self.all_request(false);
        let verdict = self.api.decompose_all(&request).await?;

        if verdict.lj_preserved != Some(true) {
            let explanation = verdict
                .lj_details
                .iter()
                .find(|d| !d.is_lossless)
                .map(|d| d.explanation.clone());
            info!("solver rejected the decomposition as lossy");
            return Ok(CheckOutcome::NotLossless {
                explanation,
                warnings,
            });
        }

        let dp_preserved = verdict.dp_preserved.unwrap_or(true);
        if !dp_preserved {
            warn!(
                missing = verdict.missing_fds.len(),
                "decomposition does not preserve every dependency"
            );
        }

        self.history.push(self.state.snapshot());
        self.state.lock()?;
        self.annotate_from_results(&verdict.table_results);
        if verdict.global_ric.is_some() {
            self.global_ric = verdict.global_ric;
        }
        if !verdict.union_cols.is_empty() {
            self.union_cols = verdict.union_cols;
        }
        info!(
            tables = self.state.table_count(),
            attempt = self.session.attempts(),
            "decomposition accepted and locked"
        );

        Ok(CheckOutcome::Locked {
            dp_preserved,
            missing_fds: verdict.missing_fds,
            warnings,
        })
    }

    /// Unlock the decomposition for further edits.
    ///
    /// A no-op when the state is already editable. The next accepted check
    /// will count as a new attempt.
    pub fn change_decomposition(&mut self) -> Result<()> {
        if self.compute_in_progress() {
            return Err(ClientError::State(
                "cannot change the decomposition while a compute pass is running".to_string(),
            ));
        }
        if !self.state.is_locked() {
            return Ok(());
        }
        self.state.unlock();
        info!("decomposition unlocked for changes");
        Ok(())
    }

    /// Restore the most recent snapshot from the undo stack.
    pub fn undo(&mut self) -> UndoOutcome {
        match self.history.pop() {
            Some(snapshot) => {
                self.state.restore(&snapshot);
                // Group annotations referred to the discarded layout.
                self.global_ric = None;
                self.union_cols = (0..self.state.base_columns().len()).collect();
                self.union_rows.clear();
                info!(remaining = self.history.len(), "restored previous layout");
                UndoOutcome::Restored
            }
            None => {
                debug!("undo requested with empty history");
                UndoOutcome::NothingToRestore
            }
        }
    }

    /// Seed the undo stack from snapshots persisted on the server, oldest
    /// first. Entries that fail to parse are recovered as empty layouts.
    /// Returns how many snapshots were loaded.
    pub async fn restore_history_from_server(&mut self) -> Result<usize> {
        let encoded = self.api.fetch_history().await?;
        let count = encoded.len();
        for entry in &encoded {
            self.history.push(Snapshot::from_json_lossy(entry));
        }
        if count > 0 {
            info!(count, "seeded undo history from the server");
        }
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Compute pass
    // -----------------------------------------------------------------------

    /// Run the streamed compute pass over the locked decomposition.
    ///
    /// Starts a solver job, follows its progress stream to completion, then
    /// refines each table sequentially with a single-table solver call. A
    /// single table's failure is logged and skipped; the stream failing is
    /// an error. Only one pass may run at a time per driver.
    pub async fn compute_all_ric(&mut self) -> Result<ComputeOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("compute pass requested while one is already running");
            return Ok(ComputeOutcome::AlreadyRunning);
        }
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        if !self.state.is_locked() {
            return Err(ClientError::State(
                "decomposition must be checked and locked before computing".to_string(),
            ));
        }
        self.run_compute_pass().await
    }

    async fn run_compute_pass(&mut self) -> Result<ComputeOutcome> {
        let request = self.all_request(true);
        let token = self.api.start_stream(&request).await?;
        info!(token = %token, "compute pass started");

        let mut job = ComputationJob::new(token);
        job.run(self.progress.as_ref()).await;
        self.progress_log = job.progress_log().to_vec();

        let payload = match job.state() {
            JobState::Completed => job.take_result().ok_or_else(|| {
                ClientError::Stream("completed job delivered no payload".to_string())
            })?,
            _ => {
                let reason = job
                    .failure()
                    .unwrap_or("stream ended in an unknown state")
                    .to_string();
                return Err(ClientError::Stream(reason));
            }
        };

        if payload.global_ric.is_some() {
            self.global_ric = payload.global_ric.clone();
        }
        if !payload.union_cols.is_empty() {
            self.union_cols = payload.union_cols.clone();
        }
        if !payload.global_manual_rows.is_empty() {
            self.union_rows = payload.global_manual_rows.clone();
        }

        // Sequential so one table's annotations land before the next call;
        // a failed table is skipped rather than failing the pass.
        let ids = self.state.table_ids();
        for (index, id) in ids.iter().enumerate() {
            if let Err(error) = self.recompute_table(*id, index, &payload).await {
                warn!(table = %id, %error, "per-table recompute failed, continuing");
            }
        }

        if payload.bcnf_decomposition {
            let attempts = self.session.attempts();
            let elapsed_secs = self.session.elapsed_secs();
            info!(attempts, elapsed_secs, "decomposition reached BCNF");
            return Ok(ComputeOutcome::BcnfReached {
                attempts,
                elapsed_secs,
            });
        }
        Ok(ComputeOutcome::ContinueNormalization)
    }

    async fn recompute_table(
        &mut self,
        id: TableId,
        index: usize,
        payload: &DecomposeAllResponse,
    ) -> Result<()> {
        // A result for a table that no longer exists is dropped.
        let (columns, manual_data) = match self.state.table(id) {
            Some(table) => (table.columns().to_vec(), format_manual_data(table.rows())),
            None => return Ok(()),
        };

        let request = DecomposeRequest {
            computation_id: Some(self.config.computation_id.clone()),
            columns: columns.clone(),
            manual_data,
            fds: self.table_wire_fds(&columns),
            time_limit: self.config.time_limit,
            monte_carlo: self.config.monte_carlo,
            samples: self.config.samples,
            base_columns: Some(self.state.base_columns().to_vec()),
        };
        let response = self.api.decompose(&request).await?;

        // The group result's matrix wins; the single-table response fills in.
        let ric = payload
            .table_results
            .get(index)
            .and_then(|r| r.ric.clone())
            .or_else(|| response.ric.clone());
        if let Some(matrix) = ric {
            if let Err(error) = self.state.set_ric(id, matrix) {
                warn!(table = %id, %error, "RIC matrix rejected, skipping");
            }
        }

        // Clauses the solver found beyond the direct projection are
        // transitive dependencies; they get flagged separately.
        let direct = project_all(&self.fds, &columns);
        let local = if response.projected_fds.is_empty() {
            direct.clone()
        } else {
            parse_fd_list(&response.projected_fds.join(";"))
        };
        let transitive: Vec<Fd> = local
            .iter()
            .filter(|fd| !direct.contains(fd))
            .cloned()
            .collect();
        let original: Vec<Fd> = self
            .fds
            .iter()
            .filter(|fd| project(fd, &columns).is_some())
            .cloned()
            .collect();

        self.state.annotate_fds(id, original, local)?;
        self.state.annotate_transitive(id, transitive)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stage navigation
    // -----------------------------------------------------------------------

    /// Ask the solver to project the global FDs onto one table's columns,
    /// falling back to the local projection when the call fails.
    pub async fn fetch_projected_fds(&self, id: TableId) -> Result<Vec<Fd>> {
        let columns = match self.state.table(id) {
            Some(table) => table.columns().to_vec(),
            None => return Err(CoreError::unknown_table(id).into()),
        };
        let request = ProjectFdsRequest {
            columns: columns.clone(),
            computation_id: Some(self.config.computation_id.clone()),
        };
        match self.api.project_fds(&request).await {
            Ok(clauses) => Ok(parse_fd_list(&clauses.join(";"))),
            Err(error) => {
                warn!(%error, "FD projection call failed, using local projection");
                Ok(project_all(&self.fds, &columns))
            }
        }
    }

    /// The full session snapshot the stage-navigation endpoints expect.
    pub fn snapshot_payload(&self) -> SnapshotPayload {
        let mut columns_per_table = Vec::new();
        let mut manual_per_table = Vec::new();
        let mut fds_per_table = Vec::new();
        let mut fds_per_table_original = Vec::new();
        let mut ric_per_table = Vec::new();
        for table in self.state.tables() {
            columns_per_table.push(table.columns().to_vec());
            manual_per_table.push(format_manual_data(table.rows()));
            fds_per_table.push(format_fd_list(table.fds_local()));
            fds_per_table_original.push(format_fd_list(table.fds_original()));
            ric_per_table.push(table.ric().cloned().unwrap_or_default());
        }
        let global_ric = self.global_ric.clone().unwrap_or_default();
        SnapshotPayload {
            columns_per_table,
            manual_per_table,
            fds_per_table,
            fds_per_table_original,
            ric_per_table,
            original_ric: global_ric.clone(),
            global_ric,
            union_cols: self.union_cols.clone(),
            original_table: format_manual_data(self.state.base_rows()),
            computation_id: Some(self.config.computation_id.clone()),
            attempts: None,
            elapsed_time: None,
        }
    }

    /// Persist the accepted decomposition and move to the next stage.
    ///
    /// Resets the attempt counter; the session clock keeps running. Returns
    /// the navigation target the server redirected to, when it named one.
    pub async fn advance_stage(&mut self) -> Result<Option<String>> {
        if !self.state.is_locked() {
            return Err(ClientError::State(
                "no accepted decomposition to continue with".to_string(),
            ));
        }
        let payload = self.snapshot_payload();
        let target = self.api.advance_stage(&payload).await?;
        self.session.reset_attempts();
        info!(target = target.as_deref().unwrap_or("-"), "stage advanced");
        Ok(target)
    }

    /// Submit the finished decomposition for BCNF review, stamped with the
    /// session's attempt count and elapsed seconds.
    pub async fn submit_bcnf_review(&self) -> Result<Option<String>> {
        let mut payload = self.snapshot_payload();
        payload.attempts = Some(self.session.attempts());
        payload.elapsed_time = Some(self.session.elapsed_secs());
        self.api.submit_bcnf_review(&payload).await
    }

    // -----------------------------------------------------------------------
    // Request assembly
    // -----------------------------------------------------------------------

    /// Local-numbered wire clauses for the FDs that survive projection onto
    /// `columns`.
    fn table_wire_fds(&self, columns: &[usize]) -> String {
        format_fd_list(&project_all(&self.fds, columns))
    }

    fn table_entries(&self, with_budget: bool) -> Vec<DecomposeTableEntry> {
        self.state
            .tables()
            .map(|table| {
                let mut entry = DecomposeTableEntry {
                    columns: table.columns().to_vec(),
                    manual_data: Some(format_manual_data(table.rows())),
                    fds: Some(self.table_wire_fds(table.columns())),
                    ..DecomposeTableEntry::default()
                };
                if with_budget {
                    entry.time_limit = Some(self.config.time_limit);
                    entry.monte_carlo = Some(self.config.monte_carlo);
                    entry.samples = Some(self.config.samples);
                    entry.base_columns = Some(self.state.base_columns().to_vec());
                }
                entry
            })
            .collect()
    }

    fn all_request(&self, with_budget: bool) -> DecomposeAllRequest {
        DecomposeAllRequest {
            computation_id: Some(self.config.computation_id.clone()),
            tables: self.table_entries(with_budget),
            lossless_join: true,
            dependency_preserve: true,
            fds: format_fd_list(&self.fds),
            manual_data: Some(format_manual_data(self.state.base_rows())),
            base_columns: Some(self.state.base_columns().to_vec()),
            time_limit: with_budget.then_some(self.config.time_limit),
            monte_carlo: with_budget.then_some(self.config.monte_carlo),
            samples: with_budget.then_some(self.config.samples),
        }
    }

    fn annotate_from_results(&mut self, results: &[DecomposeResponse]) {
        let ids = self.state.table_ids();
        for (index, id) in ids.iter().enumerate() {
            let columns = match self.state.table(*id) {
                Some(table) => table.columns().to_vec(),
                None => continue,
            };
            let local = match results.get(index) {
                Some(r) if !r.projected_fds.is_empty() => {
                    parse_fd_list(&r.projected_fds.join(";"))
                }
                _ => project_all(&self.fds, &columns),
            };
            let original: Vec<Fd> = self
                .fds
                .iter()
                .filter(|fd| project(fd, &columns).is_some())
                .cloned()
                .collect();
            if let Err(error) = self.state.annotate_fds(*id, original, local) {
                warn!(table = %id, %error, "FD annotation failed");
            }
            if let Some(matrix) = results.get(index).and_then(|r| r.ric.clone()) {
                if let Err(error) = self.state.set_ric(*id, matrix) {
                    warn!(table = %id, %error, "RIC matrix rejected, skipping");
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
