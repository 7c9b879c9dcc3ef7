//! Stable tuple deduplication and the tuple wire codec.
//!
//! Projecting a relation onto a column subset generally produces duplicate
//! tuples. The solver payload carries only the unique ones, and per-row
//! results coming back must be relatable to the global rows they came from,
//! so dedup keeps a link from every unique tuple to the first global row
//! that produced it.
//!
//! Tuple keys escape the join separator (`|` and `\` become `\|` and `\\`)
//! so distinct tuples can never collide on cell values that contain the raw
//! separator. The solver-facing tuple wire format (`,`/`;` joined) is
//! unescaped; that limitation belongs to the solver contract, not the key.

use std::collections::HashMap;

/// Separator used between cell values in a tuple key.
const KEY_SEPARATOR: char = '|';
const KEY_ESCAPE: char = '\\';

/// Result of deduplicating rows projected onto a column subset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dedup {
    /// Unique projected tuples in first-occurrence order.
    pub unique: Vec<Vec<String>>,
    /// Global row index of the first occurrence, aligned with `unique`.
    pub first_rows: Vec<usize>,
    /// Tuple key → global row index of the first occurrence.
    pub first_by_key: HashMap<String, usize>,
}

impl Dedup {
    /// Number of unique tuples.
    pub fn len(&self) -> usize {
        self.unique.len()
    }

    /// Whether no tuples survived projection.
    pub fn is_empty(&self) -> bool {
        self.unique.is_empty()
    }
}

/// Build the collision-safe key for one projected tuple.
pub fn tuple_key(values: &[String]) -> String {
    let mut key = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        for c in value.chars() {
            if c == KEY_SEPARATOR || c == KEY_ESCAPE {
                key.push(KEY_ESCAPE);
            }
            key.push(c);
        }
    }
    key
}

/// Project `rows` onto `columns` and drop duplicate tuples, keeping first
/// occurrences in order.
///
/// Cells are trimmed; a column index past the end of a row projects to the
/// empty string (ragged input from restored sessions).
pub fn dedupe(rows: &[Vec<String>], columns: &[usize]) -> Dedup {
    let mut out = Dedup::default();
    for (row_idx, row) in rows.iter().enumerate() {
        let tuple: Vec<String> = columns
            .iter()
            .map(|&col| row.get(col).map(|c| c.trim().to_string()).unwrap_or_default())
            .collect();
        let key = tuple_key(&tuple);
        if !out.first_by_key.contains_key(&key) {
            out.first_by_key.insert(key, row_idx);
            out.first_rows.push(row_idx);
            out.unique.push(tuple);
        }
    }
    out
}

/// Parse solver tuple text (`"r1c1,r1c2;r2c1,..."`) into rows of trimmed
/// cells, dropping rows that hold nothing but separators or whitespace.
pub fn parse_manual_data(text: &str) -> Vec<Vec<String>> {
    text.split(';')
        .filter(|row| !row.replace(',', "").trim().is_empty())
        .map(|row| row.split(',').map(|cell| cell.trim().to_string()).collect())
        .collect()
}

/// Join rows back into solver tuple text.
pub fn format_manual_data(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(","))
        .collect::<Vec<_>>()
        .join(";")
}

/// Drop blank rows from already-encoded tuple text without reparsing cells.
pub fn sanitize_manual_data(text: &str) -> String {
    text.trim()
        .split(';')
        .map(str::trim)
        .filter(|row| !row.replace(',', "").trim().is_empty())
        .collect::<Vec<_>>()
        .join(";")
}
