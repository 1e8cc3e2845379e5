//! Private-memory workers that trade boundary deltas with their ring neighbours.
//!
//! Each worker keeps a full-size grid but only its owned rows and the two
//! halo rows around them stay meaningful. Per frame the halo rows are zeroed,
//! the owned rows are scanned, and whatever accumulated in each halo row is
//! the pure delta the neighbour must add into its own boundary row.

use std::sync::{Arc, Barrier};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::trace;

use crate::error::LifeError;
use crate::grid::{CellStore, PackedGrid, Scratch};
use crate::partition::{Partition, ring_neighbors};
use crate::step;
use crate::timing::Timings;

/// One boundary row in flight, tagged with the frame that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundaryRow {
    pub frame: u64,
    pub cells: Vec<u8>,
}

/// Point-to-point link with one ring neighbour.
#[derive(Debug)]
pub struct EdgeLink {
    peer: usize,
    tx: Sender<BoundaryRow>,
    rx: Receiver<BoundaryRow>,
}

impl EdgeLink {
    #[inline]
    pub fn peer(&self) -> usize {
        self.peer
    }

    /// Same link, reporting the peer under a different rank.
    pub(crate) fn with_peer(self, peer: usize) -> Self {
        Self { peer, ..self }
    }

    pub fn send(&self, frame: u64, cells: Vec<u8>) -> Result<(), LifeError> {
        trace!(peer = self.peer, frame, "send boundary row");
        self.tx
            .send(BoundaryRow { frame, cells })
            .map_err(|_| LifeError::PeerDisconnected { peer: self.peer })
    }

    /// Blocks for the peer's row of `frame`.
    pub fn recv(&self, frame: u64, width: usize) -> Result<Vec<u8>, LifeError> {
        let row = self
            .rx
            .recv()
            .map_err(|_| LifeError::PeerDisconnected { peer: self.peer })?;
        self.accept(row, frame, width)
    }

    /// Returns the peer's row of `frame` if it has already arrived.
    pub fn try_recv(&self, frame: u64, width: usize) -> Result<Option<Vec<u8>>, LifeError> {
        match self.rx.try_recv() {
            Ok(row) => self.accept(row, frame, width).map(Some),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(LifeError::PeerDisconnected { peer: self.peer }),
        }
    }

    fn accept(&self, row: BoundaryRow, frame: u64, width: usize) -> Result<Vec<u8>, LifeError> {
        if row.frame != frame {
            return Err(LifeError::FrameMismatch {
                expected: frame,
                actual: row.frame,
            });
        }
        if row.cells.len() != width {
            return Err(LifeError::RowLength {
                expected: width,
                actual: row.cells.len(),
            });
        }
        trace!(peer = self.peer, frame, "recv boundary row");
        Ok(row.cells)
    }
}

/// A rank's two links: `upper` towards `prev`, `lower` towards `next`.
#[derive(Debug)]
pub struct RingLinks {
    pub upper: EdgeLink,
    pub lower: EdgeLink,
}

/// Wires a ring of `members` ranks.
///
/// Every rank owns two inboxes, one for rows arriving from above and one
/// for rows arriving from below, so a ring of two still tells the
/// directions apart. Returns nothing for a ring of one: there is no peer
/// to exchange with.
pub fn ring_links(members: usize) -> Vec<Option<RingLinks>> {
    if members < 2 {
        return (0..members).map(|_| None).collect();
    }
    let (from_above_tx, from_above_rx): (Vec<_>, Vec<_>) =
        (0..members).map(|_| crossbeam_channel::unbounded()).unzip();
    let (from_below_tx, from_below_rx): (Vec<_>, Vec<_>) =
        (0..members).map(|_| crossbeam_channel::unbounded()).unzip();

    from_above_rx
        .into_iter()
        .zip(from_below_rx)
        .enumerate()
        .map(|(rank, (above_rx, below_rx))| {
            let (prev, next) = ring_neighbors(rank, members);
            Some(RingLinks {
                upper: EdgeLink {
                    peer: prev,
                    tx: from_below_tx[prev].clone(),
                    rx: above_rx,
                },
                lower: EdgeLink {
                    peer: next,
                    tx: from_above_tx[next].clone(),
                    rx: below_rx,
                },
            })
        })
        .collect()
}

/// Sends the contents of halo row `y`.
pub(crate) fn push_row<S: CellStore>(
    store: &S,
    link: &EdgeLink,
    frame: u64,
    y: usize,
) -> Result<(), LifeError> {
    link.send(frame, store.copy_row(y))
}

/// Waits for the peer's delta and adds it into owned row `y`.
pub(crate) fn pull_row<S: CellStore>(
    store: &mut S,
    link: &EdgeLink,
    frame: u64,
    y: usize,
) -> Result<(), LifeError> {
    let width = store.dims().width;
    let row = link.recv(frame, width)?;
    store.merge_row(y, &row)
}

/// Per-worker state of the blocking halo exchange.
pub struct HaloExchange {
    pub(crate) grid: PackedGrid,
    pub(crate) scratch: Scratch,
    pub(crate) part: Partition,
    pub(crate) links: Option<RingLinks>,
    pub(crate) barrier: Arc<Barrier>,
}

impl HaloExchange {
    /// `grid` must already hold the full initial generation so the counts
    /// around the owned rows start out right.
    pub fn new(
        grid: PackedGrid,
        part: Partition,
        links: Option<RingLinks>,
        barrier: Arc<Barrier>,
    ) -> Result<Self, LifeError> {
        let scratch = Scratch::new(grid.dims())?;
        Ok(Self {
            grid,
            scratch,
            part,
            links,
            barrier,
        })
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        self.part
    }

    /// Zeroes both halo rows so they collect only this frame's spill.
    pub(crate) fn clear_halos(&mut self) {
        if self.links.is_some() {
            let dims = self.grid.dims();
            self.grid.clear_row(self.part.halo_top(dims));
            self.grid.clear_row(self.part.halo_bottom(dims));
        }
    }

    pub fn advance(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        timings.compute(|| {
            self.clear_halos();
            step::advance(&mut self.grid, &mut self.scratch, self.part);
        });

        if let Some(links) = &self.links {
            let dims = self.grid.dims();
            let grid = &mut self.grid;
            let part = self.part;
            timings.communicate(|| -> Result<(), LifeError> {
                push_row(&*grid, &links.upper, frame, part.halo_top(dims))?;
                push_row(&*grid, &links.lower, frame, part.halo_bottom(dims))?;
                pull_row(grid, &links.lower, frame, part.height)?;
                pull_row(grid, &links.upper, frame, part.height0)
            })?;
        }

        timings.communicate(|| self.barrier.wait());
        Ok(())
    }

    pub fn owned_rows(&self) -> Vec<u8> {
        self.grid.as_bytes()[self.part.byte_span(self.grid.dims())].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::{HaloExchange, ring_links};
    use crate::error::LifeError;
    use crate::grid::{Dims, PackedGrid, Scratch};
    use crate::partition::partition_table;
    use crate::step;
    use crate::timing::Timings;

    #[test]
    fn ring_of_two_keeps_directions_apart() {
        let mut links = ring_links(2);
        let b = links.pop().unwrap().unwrap();
        let a = links.pop().unwrap().unwrap();
        assert_eq!((a.upper.peer(), a.lower.peer()), (1, 1));

        a.upper.send(0, vec![1, 2]).unwrap();
        a.lower.send(0, vec![3, 4]).unwrap();
        // Rank 0's upper row lands in rank 1's from-below inbox.
        assert_eq!(b.lower.recv(0, 2).unwrap(), vec![1, 2]);
        assert_eq!(b.upper.recv(0, 2).unwrap(), vec![3, 4]);
    }

    #[test]
    fn ring_of_one_has_no_links() {
        let links = ring_links(1);
        assert_eq!(links.len(), 1);
        assert!(links[0].is_none());
    }

    #[test]
    fn recv_checks_frame_and_width() {
        let links = ring_links(3);
        let (a, b) = (links[0].as_ref().unwrap(), links[1].as_ref().unwrap());
        a.lower.send(4, vec![0; 5]).unwrap();
        assert!(matches!(
            b.upper.recv(5, 5),
            Err(LifeError::FrameMismatch { expected: 5, actual: 4 })
        ));
        a.lower.send(5, vec![0; 4]).unwrap();
        assert!(matches!(
            b.upper.recv(5, 5),
            Err(LifeError::RowLength { expected: 5, actual: 4 })
        ));
        assert!(b.upper.try_recv(6, 5).unwrap().is_none());
    }

    #[test]
    fn dropped_peer_reports_disconnect() {
        let mut links = ring_links(2);
        let b = links.pop().unwrap().unwrap();
        drop(links);
        assert!(matches!(
            b.upper.recv(0, 4),
            Err(LifeError::PeerDisconnected { peer: 0 })
        ));
    }

    #[test]
    fn four_workers_match_serial() {
        let dims = Dims::new(10, 16).unwrap();
        let alive = [(1, 3), (2, 4), (0, 5), (1, 5), (2, 5), (6, 7), (6, 8), (6, 9)];
        let frames = 12;
        let initial = PackedGrid::with_alive(dims, alive).unwrap();
        let table = partition_table(dims, 4).unwrap();
        let barrier = Arc::new(Barrier::new(4));

        let rows: Vec<Vec<u8>> = thread::scope(|s| {
            let handles: Vec<_> = table
                .iter()
                .zip(ring_links(4))
                .map(|(&part, links)| {
                    let mut worker =
                        HaloExchange::new(initial.clone(), part, links, Arc::clone(&barrier))
                            .unwrap();
                    s.spawn(move || {
                        let mut timings = Timings::default();
                        for frame in 0..frames {
                            worker.advance(frame, &mut timings).unwrap();
                        }
                        worker.owned_rows()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut serial = initial.clone();
        let mut scratch = Scratch::new(dims).unwrap();
        let whole = partition_table(dims, 1).unwrap()[0];
        for _ in 0..frames {
            step::advance(&mut serial, &mut scratch, whole);
        }
        assert_eq!(rows.concat(), serial.as_bytes());
    }
}
