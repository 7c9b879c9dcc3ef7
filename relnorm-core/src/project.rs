//! Projection of functional dependencies onto a column subset.
//!
//! A decomposed table only understands its own attribute numbering, so FDs
//! expressed over global indices are rewritten into local positions before
//! they are sent to the solver or displayed. An FD that references any
//! attribute outside the table's columns is not applicable there and is
//! silently dropped (that is projection semantics, not an error).

use crate::fd::Fd;
use crate::index::to_local;

/// Project a global-indexed FD onto `columns`.
///
/// Returns the FD rewritten into local positions (0-based internally;
/// [`Fd::to_wire`] renders them as the 1-based labels the solver expects),
/// or `None` when any referenced attribute is missing from `columns`. A
/// constant FD (empty lhs) is applicable whenever its rhs attributes are
/// all present.
///
/// Pure function of its inputs; projecting the same FD against the same
/// columns always yields the same result.
pub fn project(fd: &Fd, columns: &[usize]) -> Option<Fd> {
    let map_side = |side: &std::collections::BTreeSet<usize>| {
        side.iter()
            .map(|&attr| to_local(attr, columns).map(|local| local - 1))
            .collect::<Option<std::collections::BTreeSet<usize>>>()
    };
    Some(Fd {
        lhs: map_side(&fd.lhs)?,
        rhs: map_side(&fd.rhs)?,
    })
}

/// Project every FD in `fds`, dropping the non-applicable ones.
///
/// Input order is preserved for the survivors.
pub fn project_all(fds: &[Fd], columns: &[usize]) -> Vec<Fd> {
    fds.iter().filter_map(|fd| project(fd, columns)).collect()
}

/// Project an FD and render it straight into local wire form (`"1,3->2"`).
pub fn to_local_wire(fd: &Fd, columns: &[usize]) -> Option<String> {
    project(fd, columns).map(|local| local.to_wire())
}
