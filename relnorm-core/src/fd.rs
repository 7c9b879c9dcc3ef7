//! Functional dependencies and their wire text format.
//!
//! Wire clauses look like `"1,4->3"`: comma-separated column numbers,
//! 1-based on the wire, `->` between the two sides, clauses joined with
//! `;`. Internally both sides are 0-based index sets (global indices when
//! parsed from user/server text, local positions after projection).
//!
//! Parsing is lossy by contract: a clause that cannot be parsed is skipped
//! with a warning rather than failing the whole list, since persisted
//! session data from older builds may carry garbage.

use std::collections::BTreeSet;
use std::fmt;
use tracing::warn;

/// A functional dependency over column indices.
///
/// Both sides are kept sorted and deduplicated. The index space (global or
/// table-local) is decided by context; see [`crate::project`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fd {
    /// Determinant attributes. May be empty (a constant dependency).
    pub lhs: BTreeSet<usize>,
    /// Determined attributes.
    pub rhs: BTreeSet<usize>,
}

impl Fd {
    /// Build an FD from iterators of 0-based indices.
    pub fn new(
        lhs: impl IntoIterator<Item = usize>,
        rhs: impl IntoIterator<Item = usize>,
    ) -> Self {
        Fd {
            lhs: lhs.into_iter().collect(),
            rhs: rhs.into_iter().collect(),
        }
    }

    /// All attributes referenced by this FD (lhs ∪ rhs).
    pub fn attributes(&self) -> BTreeSet<usize> {
        self.lhs.union(&self.rhs).copied().collect()
    }

    /// Parse one wire clause (`"1,4->3"`, 1-based) into 0-based sets.
    ///
    /// Returns `None` for anything malformed: missing or repeated `->`, a
    /// non-numeric column token, or a column number of 0 (labels start at
    /// 1). An empty side is allowed; `"->3"` is a constant dependency.
    pub fn parse_clause(text: &str) -> Option<Fd> {
        let normalized = normalize_clause(text);
        if normalized.is_empty() {
            return None;
        }
        let mut parts = normalized.split("->");
        let lhs_text = parts.next()?;
        let rhs_text = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Fd {
            lhs: parse_side(lhs_text)?,
            rhs: parse_side(rhs_text)?,
        })
    }

    /// Format as a wire clause, shifting indices back to 1-based.
    pub fn to_wire(&self) -> String {
        format!("{}->{}", format_side(&self.lhs), format_side(&self.rhs))
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Strip all whitespace and canonicalize the arrow.
fn normalize_clause(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .replace('→', "->")
}

fn parse_side(text: &str) -> Option<BTreeSet<usize>> {
    let mut side = BTreeSet::new();
    for token in text.split(',').filter(|t| !t.is_empty()) {
        let label: usize = token.parse().ok()?;
        // Wire labels are 1-based; 0 means the clause is garbage.
        side.insert(label.checked_sub(1)?);
    }
    Some(side)
}

fn format_side(side: &BTreeSet<usize>) -> String {
    side.iter()
        .map(|idx| (idx + 1).to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a `;`-joined (or newline-joined) FD list, skipping malformed
/// clauses with a warning.
pub fn parse_fd_list(text: &str) -> Vec<Fd> {
    text.split([';', '\n', '\r'])
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .filter_map(|clause| match Fd::parse_clause(clause) {
            Some(fd) => Some(fd),
            None => {
                warn!(clause = %clause, "skipping malformed FD clause");
                None
            }
        })
        .collect()
}

/// Join FDs into the `;`-separated wire form.
pub fn format_fd_list(fds: &[Fd]) -> String {
    fds.iter()
        .map(Fd::to_wire)
        .collect::<Vec<_>>()
        .join(";")
}
