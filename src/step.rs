//! Single-partition generation scan shared by every synchronization mode.

use crate::grid::cell::transition;
use crate::grid::{CellStore, Scratch};
use crate::partition::Partition;

/// Applies this frame's decisions for row `y`, reading only `scratch`.
///
/// Zero bytes (dead, no neighbours) are skipped without decoding.
#[inline]
pub fn scan_row<S: CellStore>(store: &mut S, scratch: &Scratch, y: usize) {
    let row = scratch.row(y);
    for (x, &cell) in row.iter().enumerate() {
        if cell == 0 {
            continue;
        }
        if let Some(change) = transition(cell) {
            store.apply(x, y, change);
        }
    }
}

/// Scans every owned row of `part` against an existing snapshot.
pub fn scan_partition<S: CellStore>(store: &mut S, scratch: &Scratch, part: Partition) {
    for y in part.rows() {
        scan_row(store, scratch, y);
    }
}

/// Snapshot followed by a scan of `part`; the complete single-worker frame.
pub fn advance<S: CellStore>(store: &mut S, scratch: &mut Scratch, part: Partition) {
    store.snapshot_into(scratch);
    scan_partition(store, scratch, part);
}
