//! One physical grid addressed by every worker of a group.
//!
//! The segment is a slice of `AtomicU8`, so the two partitions adjacent to
//! a boundary row may add into the same byte in the same frame and the
//! increments still compose. `Relaxed` is enough for the cell traffic;
//! the group barrier orders each frame's writes before the next snapshot.

use std::sync::Arc;
use std::sync::Barrier;
use std::sync::atomic::{AtomicU8, Ordering};

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use crate::error::LifeError;
use crate::grid::cell::{self, Transition};
use crate::grid::{CellStore, Dims, Scratch, check_row_len};
use crate::partition::Partition;
use crate::step;
use crate::timing::Timings;

/// Capability to load and store into a group's shared grid buffer.
///
/// Cloning shares the same buffer; the buffer lives as long as the last clone.
#[derive(Clone, Debug)]
pub struct SharedGridHandle {
    dims: Dims,
    cells: Arc<[AtomicU8]>,
}

impl SharedGridHandle {
    pub fn allocate(dims: Dims) -> Result<Self, LifeError> {
        let len = dims.size();
        let mut cells: Vec<AtomicU8> = Vec::new();
        cells
            .try_reserve_exact(len)
            .map_err(|_| LifeError::Allocation { bytes: len })?;
        cells.extend((0..len).map(|_| AtomicU8::new(0)));
        Ok(Self {
            dims,
            cells: cells.into(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Fails when the segment does not hold exactly `expected` bytes.
    pub fn verify(&self, expected: usize) -> Result<(), LifeError> {
        if self.cells.len() != expected {
            return Err(LifeError::SegmentSizeMismatch {
                expected,
                actual: self.cells.len(),
            });
        }
        Ok(())
    }

    #[inline]
    pub fn load(&self, x: usize, y: usize) -> u8 {
        self.cells[self.dims.index(x, y)].load(Ordering::Relaxed)
    }

    fn reset(&self) {
        for c in self.cells.iter() {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn load_alive(&mut self, alive: &[(usize, usize)]) {
        for &(x, y) in alive {
            if self.dims.contains(x, y) && !cell::is_alive(self.load(x, y)) {
                self.set_alive(x, y);
            }
        }
    }

    /// Copies the bytes of `part`'s owned rows.
    pub fn copy_rows(&self, part: Partition) -> Vec<u8> {
        self.cells[part.byte_span(self.dims)]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

impl CellStore for SharedGridHandle {
    #[inline]
    fn dims(&self) -> Dims {
        self.dims
    }

    fn snapshot_into(&self, scratch: &mut Scratch) {
        for (dst, src) in scratch.as_mut_slice().iter_mut().zip(self.cells.iter()) {
            *dst = src.load(Ordering::Relaxed);
        }
    }

    #[inline]
    fn apply(&mut self, x: usize, y: usize, transition: Transition) {
        let target = &self.cells[self.dims.index(x, y)];
        match transition {
            Transition::Birth => target.fetch_or(cell::ALIVE, Ordering::Relaxed),
            Transition::Death => target.fetch_and(!cell::ALIVE, Ordering::Relaxed),
        };
        let delta = transition.neighbor_delta();
        for n in self.dims.neighbor_indices(x, y) {
            self.cells[n].fetch_add(delta, Ordering::Relaxed);
        }
    }

    fn clear_row(&mut self, y: usize) {
        for c in &self.cells[self.dims.row_span(y)] {
            c.store(0, Ordering::Relaxed);
        }
    }

    fn copy_row(&self, y: usize) -> Vec<u8> {
        self.cells[self.dims.row_span(y)]
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    fn merge_row(&mut self, y: usize, row: &[u8]) -> Result<(), LifeError> {
        check_row_len(self.dims, row)?;
        for (dst, &src) in self.cells[self.dims.row_span(y)].iter().zip(row) {
            dst.fetch_add(src, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Fixed metadata record the group leader sends to each member by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridMeta {
    pub width: usize,
    pub height0: usize,
    pub height: usize,
    /// Total segment bytes, `width * grid height`.
    pub size: usize,
}

impl GridMeta {
    pub fn new(dims: Dims, part: Partition) -> Self {
        Self {
            width: dims.width,
            height0: part.height0,
            height: part.height,
            size: dims.size(),
        }
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        Partition {
            height0: self.height0,
            height: self.height,
        }
    }
}

enum Role {
    Leader { members: Vec<Sender<GridMeta>> },
    Member { meta: Receiver<GridMeta> },
}

/// One worker's seat in a shared-segment group, before the segment is set up.
pub struct SegmentMember {
    local_rank: usize,
    handle: SharedGridHandle,
    barrier: Arc<Barrier>,
    role: Role,
}

/// Seats for a group of `size` workers sharing `handle`; seat 0 leads.
pub fn segment_group(handle: SharedGridHandle, size: usize) -> Vec<SegmentMember> {
    let barrier = Arc::new(Barrier::new(size));
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (1..size).map(|_| crossbeam_channel::bounded(1)).unzip();

    let mut seats = Vec::with_capacity(size);
    seats.push(SegmentMember {
        local_rank: 0,
        handle: handle.clone(),
        barrier: Arc::clone(&barrier),
        role: Role::Leader { members: senders },
    });
    for (i, meta) in receivers.into_iter().enumerate() {
        seats.push(SegmentMember {
            local_rank: i + 1,
            handle: handle.clone(),
            barrier: Arc::clone(&barrier),
            role: Role::Member { meta },
        });
    }
    seats
}

impl SegmentMember {
    #[inline]
    pub fn local_rank(&self) -> usize {
        self.local_rank
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.handle.dims()
    }

    /// Sets up the segment for this seat.
    ///
    /// The leader checks the segment size, zeroes the buffer, loads `alive`,
    /// evaluates `plan` once for the whole group and sends every member its
    /// [`GridMeta`]. Members ignore both arguments and wait for their record.
    /// Every fallible step happens before the group barrier, so a leader that
    /// fails drops its senders and every member returns `PeerDisconnected`
    /// instead of waiting at the barrier.
    pub fn establish<F>(
        self,
        alive: &[(usize, usize)],
        plan: F,
    ) -> Result<SharedSegment, LifeError>
    where
        F: FnOnce() -> Result<Vec<Partition>, LifeError>,
    {
        let SegmentMember {
            local_rank,
            handle,
            barrier,
            role,
        } = self;
        let dims = handle.dims();
        let scratch = Scratch::new(dims)?;

        let meta = match role {
            Role::Leader { members } => {
                // Every member holds a clone of this handle.
                handle.verify(dims.size())?;
                let mut store = handle.clone();
                store.reset();
                store.load_alive(alive);

                let table = plan()?;
                if table.len() != members.len() + 1 {
                    return Err(LifeError::InvalidWorkerCount);
                }
                for (peer, (tx, part)) in members.iter().zip(&table[1..]).enumerate() {
                    tx.send(GridMeta::new(dims, *part))
                        .map_err(|_| LifeError::PeerDisconnected { peer: peer + 1 })?;
                }
                GridMeta::new(dims, table[0])
            }
            Role::Member { meta } => meta
                .recv()
                .map_err(|_| LifeError::PeerDisconnected { peer: 0 })?,
        };

        debug!(
            local_rank,
            height0 = meta.height0,
            height = meta.height,
            "attached to shared segment"
        );
        barrier.wait();

        Ok(SharedSegment {
            local_rank,
            barrier,
            part: meta.partition(),
            store: handle,
            scratch,
        })
    }
}

/// A worker's frame loop over a shared segment: snapshot, barrier, scan, barrier.
pub struct SharedSegment {
    local_rank: usize,
    barrier: Arc<Barrier>,
    part: Partition,
    store: SharedGridHandle,
    scratch: Scratch,
}

impl SharedSegment {
    #[inline]
    pub fn partition(&self) -> Partition {
        self.part
    }

    #[inline]
    pub fn local_rank(&self) -> usize {
        self.local_rank
    }

    #[inline]
    pub fn store(&self) -> &SharedGridHandle {
        &self.store
    }

    /// Takes the snapshot, then waits until every member has taken theirs,
    /// so no neighbour writes of this frame can leak into it.
    pub(crate) fn begin_frame(&mut self, timings: &mut Timings) {
        timings.compute(|| self.store.snapshot_into(&mut self.scratch));
        self.sync(timings);
    }

    #[inline]
    pub(crate) fn scan_row(&mut self, y: usize, timings: &mut Timings) {
        timings.compute(|| step::scan_row(&mut self.store, &self.scratch, y));
    }

    pub(crate) fn sync(&self, timings: &mut Timings) {
        timings.communicate(|| self.barrier.wait());
    }

    pub fn advance(&mut self, timings: &mut Timings) {
        self.begin_frame(timings);
        timings.compute(|| step::scan_partition(&mut self.store, &self.scratch, self.part));
        self.sync(timings);
    }

    pub fn owned_rows(&self) -> Vec<u8> {
        self.store.copy_rows(self.part)
    }
}
