//! Global/local column index translation.
//!
//! Global indices are 0-based positions in the original relation. Local
//! indices are 1-based positions within one decomposed table's own column
//! list, matching the user-facing column labels. Both directions are pure
//! functions of the table's `columns` ordering.

/// Translate a global column index to the table-local 1-based index.
///
/// Returns `None` when the column is not part of this table.
pub fn to_local(global_idx: usize, columns: &[usize]) -> Option<usize> {
    columns.iter().position(|&c| c == global_idx).map(|p| p + 1)
}

/// Translate a table-local 1-based index back to the global column index.
///
/// Returns `None` for 0 or anything past the table's column count.
pub fn to_global(local_idx: usize, columns: &[usize]) -> Option<usize> {
    columns.get(local_idx.checked_sub(1)?).copied()
}
