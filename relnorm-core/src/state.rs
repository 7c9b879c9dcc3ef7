//! Decomposition state for one relation group.
//!
//! A relation group is one base relation (its column set and loaded rows)
//! plus the decomposed tables the user has assembled from it. Tables live
//! in an id-keyed arena owned by this state; presentation layers hold
//! [`TableId`]s and read through accessors, never the other way around.
//!
//! Column mutation arrives through the drag capability events
//! ([`DecompositionState::on_attach`] / [`DecompositionState::on_detach`])
//! and is only legal while the group is [`Phase::Editable`]. Locking is the
//! raw transition; gating it on the solver's verdict is the driving layer's
//! responsibility.

use crate::dedupe::{dedupe, parse_manual_data, sanitize_manual_data, Dedup};
use crate::error::{CoreError, Result};
use crate::fd::Fd;
use crate::history::Snapshot;
use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// Identifier of a decomposed table within its relation group.
///
/// Ids are never reused; a restore invalidates all previously handed-out
/// ids, which is what lets in-flight results for removed tables be
/// recognized and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(u64);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lock phase of a relation group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Column sets may be mutated, tables added and removed.
    Editable,
    /// Accepted decomposition; only server-verified annotations may change.
    Locked,
}

/// Raw payload supplied by the drag capability provider for a dropped
/// column. `origin_index` is the 0-based global index carried by the
/// dragged element; `label` is the visible 1-based column label, used as a
/// fallback for providers that only know the text.
#[derive(Debug, Clone, Default)]
pub struct DragPayload {
    pub origin_index: Option<String>,
    pub label: Option<String>,
}

impl DragPayload {
    /// Payload carrying an explicit global index.
    pub fn from_global(idx: usize) -> Self {
        DragPayload {
            origin_index: Some(idx.to_string()),
            label: None,
        }
    }

    /// Resolve to a global 0-based column index.
    ///
    /// An explicit `origin_index` wins and must parse on its own; the label
    /// fallback only applies when no index was carried at all.
    pub fn resolve(&self) -> Option<usize> {
        match self.origin_index.as_deref() {
            Some(raw) if !raw.is_empty() => raw.trim().parse().ok(),
            _ => {
                let label: usize = self.label.as_deref()?.trim().parse().ok()?;
                label.checked_sub(1)
            }
        }
    }
}

/// Outcome of an attach event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Column inserted at the given display position.
    Inserted { position: usize },
    /// Column already present in the target; nothing changed.
    DuplicateIgnored,
    /// Payload could not be resolved to a global index; nothing changed.
    Discarded,
}

/// Outcome of a detach event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    Removed,
    /// The column was not in the source table; nothing changed.
    NotPresent,
}

/// Outcome of a column reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Reordered,
    /// The proposed order was not a permutation of the current columns;
    /// nothing changed.
    Rejected,
}

/// One decomposed table: a distinct, display-ordered subset of the base
/// columns, the deduplicated projection of the base rows, and whatever
/// server-verified annotations the last accepted check produced.
#[derive(Debug, Clone)]
pub struct DecomposedTable {
    id: TableId,
    columns: Vec<usize>,
    projection: Dedup,
    fds_original: Vec<Fd>,
    fds_local: Vec<Fd>,
    transitive_fds: Vec<Fd>,
    ric: Option<Vec<Vec<f64>>>,
}

impl DecomposedTable {
    fn new(id: TableId, columns: Vec<usize>, base_rows: &[Vec<String>]) -> Self {
        let projection = dedupe(base_rows, &columns);
        DecomposedTable {
            id,
            columns,
            projection,
            fds_original: Vec::new(),
            fds_local: Vec::new(),
            transitive_fds: Vec::new(),
            ric: None,
        }
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    /// Global column indices in display order.
    pub fn columns(&self) -> &[usize] {
        &self.columns
    }

    /// Unique projected rows in first-occurrence order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.projection.unique
    }

    /// Projection dedup detail (first-occurrence row links).
    pub fn projection(&self) -> &Dedup {
        &self.projection
    }

    /// Global-indexed FDs that apply to this table.
    pub fn fds_original(&self) -> &[Fd] {
        &self.fds_original
    }

    /// Local-indexed FDs as the solver reported them.
    pub fn fds_local(&self) -> &[Fd] {
        &self.fds_local
    }

    /// Local-indexed FDs derivable only transitively.
    pub fn transitive_fds(&self) -> &[Fd] {
        &self.transitive_fds
    }

    /// Per-cell RIC matrix, aligned with `rows()`.
    pub fn ric(&self) -> Option<&Vec<Vec<f64>>> {
        self.ric.as_ref()
    }

    fn clear_annotations(&mut self) {
        self.fds_original.clear();
        self.fds_local.clear();
        self.transitive_fds.clear();
        self.ric = None;
    }

    fn refresh_projection(&mut self, base_rows: &[Vec<String>]) {
        self.projection = dedupe(base_rows, &self.columns);
        // Column change invalidates everything the server verified.
        self.clear_annotations();
    }
}

/// Mutable decomposition record for one relation group.
#[derive(Debug, Clone)]
pub struct DecompositionState {
    base_columns: Vec<usize>,
    base_rows: Vec<Vec<String>>,
    tables: Vec<DecomposedTable>,
    next_id: u64,
    phase: Phase,
}

impl DecompositionState {
    /// New editable group over the given base relation.
    pub fn new(base_columns: Vec<usize>, base_rows: Vec<Vec<String>>) -> Self {
        DecompositionState {
            base_columns,
            base_rows,
            tables: Vec::new(),
            next_id: 0,
            phase: Phase::Editable,
        }
    }

    /// New group from tuple text in the wire format (`;`-joined rows of
    /// `,`-joined cells). Cells are trimmed and blank rows dropped.
    pub fn from_manual_data(base_columns: Vec<usize>, manual_data: &str) -> Self {
        let rows = parse_manual_data(&sanitize_manual_data(manual_data));
        Self::new(base_columns, rows)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.phase == Phase::Locked
    }

    /// Columns the decomposition must cover.
    pub fn base_columns(&self) -> &[usize] {
        &self.base_columns
    }

    /// Rows of the base relation.
    pub fn base_rows(&self) -> &[Vec<String>] {
        &self.base_rows
    }

    pub fn tables(&self) -> impl Iterator<Item = &DecomposedTable> {
        self.tables.iter()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn table(&self, id: TableId) -> Option<&DecomposedTable> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Ids in display order.
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.iter().map(|t| t.id).collect()
    }

    /// Per-table column lists in display order (coverage-check input).
    pub fn column_sets(&self) -> Vec<Vec<usize>> {
        self.tables.iter().map(|t| t.columns.clone()).collect()
    }

    fn ensure_editable(&self, action: &str) -> Result<()> {
        if self.is_locked() {
            return Err(CoreError::locked(action));
        }
        Ok(())
    }

    fn table_mut(&mut self, id: TableId) -> Result<&mut DecomposedTable> {
        self.tables
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CoreError::unknown_table(id))
    }

    fn alloc_id(&mut self) -> TableId {
        let id = TableId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add an empty decomposed table.
    pub fn add_table(&mut self) -> Result<TableId> {
        self.add_table_with_columns(Vec::new())
    }

    /// Add a decomposed table holding the given columns.
    pub fn add_table_with_columns(&mut self, columns: Vec<usize>) -> Result<TableId> {
        self.ensure_editable("cannot add a table")?;
        let mut seen = BTreeSet::new();
        for &col in &columns {
            if !seen.insert(col) {
                return Err(CoreError::DuplicateColumn { column: col });
            }
        }
        let id = self.alloc_id();
        self.tables
            .push(DecomposedTable::new(id, columns, &self.base_rows));
        Ok(id)
    }

    /// Remove a decomposed table.
    pub fn remove_table(&mut self, id: TableId) -> Result<()> {
        self.ensure_editable("cannot remove a table")?;
        let before = self.tables.len();
        self.tables.retain(|t| t.id != id);
        if self.tables.len() == before {
            return Err(CoreError::unknown_table(id));
        }
        Ok(())
    }

    /// Capability event: a column was dropped onto `target`.
    ///
    /// `insert_hint` is the provider's drop position; it is clamped to the
    /// current column count. A payload that resolves to no index is
    /// discarded with a warning and the state is left unchanged.
    pub fn on_attach(
        &mut self,
        payload: &DragPayload,
        target: TableId,
        insert_hint: usize,
    ) -> Result<AttachOutcome> {
        self.ensure_editable("cannot attach a column")?;
        let base_rows = self.base_rows.clone();
        let table = self.table_mut(target)?;

        let Some(global_idx) = payload.resolve() else {
            warn!(table = %target, "could not resolve dropped column index, ignoring");
            return Ok(AttachOutcome::Discarded);
        };

        if table.columns.contains(&global_idx) {
            return Ok(AttachOutcome::DuplicateIgnored);
        }

        let position = insert_hint.min(table.columns.len());
        table.columns.insert(position, global_idx);
        table.refresh_projection(&base_rows);
        Ok(AttachOutcome::Inserted { position })
    }

    /// Capability event: a column was dragged out of `source`.
    pub fn on_detach(&mut self, global_idx: usize, source: TableId) -> Result<DetachOutcome> {
        self.ensure_editable("cannot detach a column")?;
        let base_rows = self.base_rows.clone();
        let table = self.table_mut(source)?;

        let before = table.columns.len();
        table.columns.retain(|&c| c != global_idx);
        if table.columns.len() == before {
            warn!(table = %source, column = global_idx, "detach of absent column, ignoring");
            return Ok(DetachOutcome::NotPresent);
        }
        table.refresh_projection(&base_rows);
        Ok(DetachOutcome::Removed)
    }

    /// Reorder a table's columns to the provider's post-drag order.
    ///
    /// `new_order` must be a permutation of the current columns; anything
    /// else is rejected with a warning and the state is left unchanged.
    pub fn reorder_columns(&mut self, id: TableId, new_order: Vec<usize>) -> Result<ReorderOutcome> {
        self.ensure_editable("cannot reorder columns")?;
        let base_rows = self.base_rows.clone();
        let table = self.table_mut(id)?;

        let current: BTreeSet<usize> = table.columns.iter().copied().collect();
        let proposed: BTreeSet<usize> = new_order.iter().copied().collect();
        if proposed != current || new_order.len() != table.columns.len() {
            warn!(table = %id, "column reorder is not a permutation, ignoring");
            return Ok(ReorderOutcome::Rejected);
        }
        table.columns = new_order;
        table.refresh_projection(&base_rows);
        Ok(ReorderOutcome::Reordered)
    }

    /// Remove tables whose column set is a proper subset of another
    /// table's, returning one warning message per removal.
    ///
    /// Equal column sets are left alone. Runs only while editable.
    pub fn prune_subset_tables(&mut self) -> Result<Vec<String>> {
        self.ensure_editable("cannot prune tables")?;
        if self.tables.len() <= 1 {
            return Ok(Vec::new());
        }

        let mut doomed: BTreeSet<usize> = BTreeSet::new();
        let mut warnings = Vec::new();

        for i in 0..self.tables.len() {
            if doomed.contains(&i) {
                continue;
            }
            for j in 0..self.tables.len() {
                if i == j || doomed.contains(&j) {
                    continue;
                }
                let cols_i = &self.tables[i].columns;
                let cols_j = &self.tables[j].columns;
                let set_j: BTreeSet<usize> = cols_j.iter().copied().collect();
                let set_i: BTreeSet<usize> = cols_i.iter().copied().collect();

                let i_subset_of_j =
                    cols_i.len() < cols_j.len() && cols_i.iter().all(|c| set_j.contains(c));
                let j_subset_of_i =
                    cols_j.len() < cols_i.len() && cols_j.iter().all(|c| set_i.contains(c));

                if i_subset_of_j {
                    warnings.push(subset_warning(i, cols_i, j, cols_j));
                    doomed.insert(i);
                    break;
                } else if j_subset_of_i {
                    warnings.push(subset_warning(j, cols_j, i, cols_i));
                    doomed.insert(j);
                }
            }
        }

        for &idx in doomed.iter().rev() {
            self.tables.remove(idx);
        }
        Ok(warnings)
    }

    /// Snapshot of the per-table column assignment in display order.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.column_sets())
    }

    /// Rebuild the group from a snapshot: fresh editable tables with the
    /// recorded columns, all annotations discarded.
    ///
    /// Previously issued [`TableId`]s are invalidated, so results from any
    /// still-running job resolve against dead ids and get dropped. Duplicate
    /// columns inside a persisted snapshot entry (corrupt history) are
    /// recovered by keeping the first occurrence.
    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.tables.clear();
        self.phase = Phase::Editable;
        for recorded in &snapshot.tables {
            let mut seen = BTreeSet::new();
            let columns: Vec<usize> = recorded
                .iter()
                .copied()
                .filter(|&c| seen.insert(c))
                .collect();
            if columns.len() != recorded.len() {
                warn!("snapshot entry held duplicate columns, keeping first occurrences");
            }
            let id = self.alloc_id();
            self.tables
                .push(DecomposedTable::new(id, columns, &self.base_rows));
        }
    }

    /// Accept the decomposition: `Editable` → `Locked`.
    pub fn lock(&mut self) -> Result<()> {
        if self.is_locked() {
            return Err(CoreError::locked("decomposition is already locked"));
        }
        self.phase = Phase::Locked;
        Ok(())
    }

    /// "Change decomposition": `Locked` → `Editable`, discarding every
    /// server-verified annotation. A no-op when already editable.
    pub fn unlock(&mut self) {
        self.phase = Phase::Editable;
        for table in &mut self.tables {
            table.clear_annotations();
        }
    }

    /// Attach the solver-verified FDs to a table. Allowed while locked;
    /// these are results, not column mutations.
    pub fn annotate_fds(
        &mut self,
        id: TableId,
        original: Vec<Fd>,
        local: Vec<Fd>,
    ) -> Result<()> {
        let table = self.table_mut(id)?;
        table.fds_original = original;
        table.fds_local = local;
        Ok(())
    }

    /// Attach the transitively-derivable FDs reported for a table.
    pub fn annotate_transitive(&mut self, id: TableId, fds: Vec<Fd>) -> Result<()> {
        let table = self.table_mut(id)?;
        table.transitive_fds = fds;
        Ok(())
    }

    /// Attach a RIC matrix, validating it against the table's shape.
    pub fn set_ric(&mut self, id: TableId, matrix: Vec<Vec<f64>>) -> Result<()> {
        let table = self.table_mut(id)?;
        let expected_rows = table.projection.unique.len();
        let expected_cols = table.columns.len();
        let actual_rows = matrix.len();
        let actual_cols = matrix.first().map(Vec::len).unwrap_or(0);
        if actual_rows != expected_rows || (actual_rows > 0 && actual_cols != expected_cols) {
            return Err(CoreError::RicShape {
                expected_rows,
                expected_cols,
                actual_rows,
                actual_cols,
            });
        }
        table.ric = Some(matrix);
        Ok(())
    }
}

fn format_labels(columns: &[usize]) -> String {
    columns
        .iter()
        .map(|&c| (c + 1).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn subset_warning(
    subset_pos: usize,
    subset_cols: &[usize],
    superset_pos: usize,
    superset_cols: &[usize],
) -> String {
    format!(
        "Table {} (columns: {}) is a subset of Table {} (columns: {}) and has been removed as it is redundant.",
        subset_pos + 1,
        format_labels(subset_cols),
        superset_pos + 1,
        format_labels(superset_cols),
    )
}
