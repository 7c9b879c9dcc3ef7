//! Column coverage validation for a set of decomposed tables.
//!
//! A decomposition may only be submitted for verification when every
//! required base column appears in at least one decomposed table. Overlap
//! is deliberately not checked: lossless-join decompositions generally
//! require shared key columns, so a column appearing in several tables is
//! fine.

use std::collections::BTreeSet;

/// Outcome of a coverage check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageReport {
    /// Whether every required column is covered.
    pub valid: bool,
    /// Required columns not present in any table, ascending, global 0-based.
    pub missing: Vec<usize>,
}

impl CoverageReport {
    /// Missing columns as the 1-based labels shown to users.
    pub fn missing_labels(&self) -> Vec<usize> {
        self.missing.iter().map(|&idx| idx + 1).collect()
    }
}

/// Check that the union of `table_columns` covers every column in
/// `required`.
pub fn check_coverage(table_columns: &[Vec<usize>], required: &[usize]) -> CoverageReport {
    let covered: BTreeSet<usize> = table_columns.iter().flatten().copied().collect();
    let missing: Vec<usize> = required
        .iter()
        .copied()
        .collect::<BTreeSet<usize>>()
        .into_iter()
        .filter(|idx| !covered.contains(idx))
        .collect();
    CoverageReport {
        valid: missing.is_empty(),
        missing,
    }
}
