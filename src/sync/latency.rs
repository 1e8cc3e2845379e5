//! Halo exchange with the sends pulled forward into the scan.
//!
//! A halo row only collects spill from the adjacent owned row, so it is
//! final as soon as that row has been scanned. Each boundary row goes out
//! right then, incoming rows are merged whenever they happen to be ready,
//! and the worker blocks only for what is still missing at the end.

use tracing::trace;

use crate::error::LifeError;
use crate::grid::{CellStore, PackedGrid};
use crate::partition::Partition;
use crate::step;
use crate::sync::halo::{EdgeLink, HaloExchange, push_row};
use crate::timing::Timings;

/// A receive posted at frame start, completed by [`poll`](Self::poll) or [`wait`](Self::wait).
pub(crate) struct PendingRow<'a> {
    link: &'a EdgeLink,
    frame: u64,
    /// Owned row the delta is added into.
    target: usize,
    merged: bool,
}

impl<'a> PendingRow<'a> {
    pub(crate) fn post(link: &'a EdgeLink, frame: u64, target: usize) -> Self {
        Self {
            link,
            frame,
            target,
            merged: false,
        }
    }

    /// Merges the row if it has arrived; never blocks.
    pub(crate) fn poll<S: CellStore>(&mut self, store: &mut S) -> Result<(), LifeError> {
        if self.merged {
            return Ok(());
        }
        let width = store.dims().width;
        if let Some(row) = self.link.try_recv(self.frame, width)? {
            store.merge_row(self.target, &row)?;
            self.merged = true;
            trace!(peer = self.link.peer(), frame = self.frame, "merged early");
        }
        Ok(())
    }

    pub(crate) fn wait<S: CellStore>(&mut self, store: &mut S) -> Result<(), LifeError> {
        if self.merged {
            return Ok(());
        }
        let width = store.dims().width;
        let row = self.link.recv(self.frame, width)?;
        store.merge_row(self.target, &row)?;
        self.merged = true;
        Ok(())
    }
}

/// Per-worker state of the overlapped halo exchange.
pub struct LatencyHidingExchange {
    inner: HaloExchange,
}

impl LatencyHidingExchange {
    pub fn new(inner: HaloExchange) -> Self {
        Self { inner }
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        self.inner.part
    }

    pub fn advance(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        let HaloExchange {
            grid,
            scratch,
            part,
            links,
            barrier,
        } = &mut self.inner;
        let part = *part;
        let dims = grid.dims();

        let Some(links) = &*links else {
            timings.compute(|| step::advance(grid, scratch, part));
            timings.communicate(|| barrier.wait());
            return Ok(());
        };

        timings.compute(|| {
            grid.clear_row(part.halo_top(dims));
            grid.clear_row(part.halo_bottom(dims));
            grid.snapshot_into(scratch);
        });

        let mut from_next = PendingRow::post(&links.lower, frame, part.height);
        let mut from_prev = PendingRow::post(&links.upper, frame, part.height0);

        for y in part.rows() {
            timings.compute(|| step::scan_row(grid, scratch, y));
            timings.communicate(|| -> Result<(), LifeError> {
                if y == part.height0 {
                    push_row(&*grid, &links.upper, frame, part.halo_top(dims))?;
                }
                if y == part.height {
                    push_row(&*grid, &links.lower, frame, part.halo_bottom(dims))?;
                }
                poll_both(grid, &mut from_next, &mut from_prev)
            })?;
        }

        timings.communicate(|| -> Result<(), LifeError> {
            from_next.wait(grid)?;
            from_prev.wait(grid)
        })?;
        timings.communicate(|| barrier.wait());
        Ok(())
    }

    pub fn owned_rows(&self) -> Vec<u8> {
        self.inner.owned_rows()
    }
}

fn poll_both(
    grid: &mut PackedGrid,
    a: &mut PendingRow<'_>,
    b: &mut PendingRow<'_>,
) -> Result<(), LifeError> {
    a.poll(grid)?;
    b.poll(grid)
}
