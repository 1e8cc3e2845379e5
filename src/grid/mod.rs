//! Packed toroidal grid storage.
//!
//! Every cell is one byte (see [`cell`]). Neighbour counts are never
//! recomputed: each birth or death adds or subtracts `NEIGHBOR_STEP` on
//! the eight wrapped neighbours, so any write that bypasses
//! [`CellStore::apply`] corrupts the counts around it.

pub mod cell;

use std::ops::Range;

use crate::error::LifeError;
use cell::Transition;

/// Grid extent. Both sides are non-zero once constructed through [`Dims::new`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dims {
    pub width: usize,
    pub height: usize,
}

impl Dims {
    pub fn new(width: usize, height: usize) -> Result<Self, LifeError> {
        if width == 0 || height == 0 {
            return Err(LifeError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    #[inline(always)]
    pub const fn size(self) -> usize {
        self.width * self.height
    }

    #[inline(always)]
    pub fn index(self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height, "({x},{y}) outside {self:?}");
        y * self.width + x
    }

    #[inline]
    pub fn coords(self, index: usize) -> (usize, usize) {
        (index % self.width, index / self.width)
    }

    #[inline]
    pub fn contains(self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height
    }

    /// Byte range of row `y` inside a flat buffer.
    #[inline]
    pub fn row_span(self, y: usize) -> Range<usize> {
        let start = self.index(0, y);
        start..start + self.width
    }

    /// Row `y - 1` with toroidal wrap.
    #[inline(always)]
    pub fn row_above(self, y: usize) -> usize {
        (y + self.height - 1) % self.height
    }

    /// Row `y + 1` with toroidal wrap.
    #[inline(always)]
    pub fn row_below(self, y: usize) -> usize {
        (y + 1) % self.height
    }

    #[inline(always)]
    fn column_left(self, x: usize) -> usize {
        (x + self.width - 1) % self.width
    }

    #[inline(always)]
    fn column_right(self, x: usize) -> usize {
        (x + 1) % self.width
    }

    /// Flat indices of the eight toroidal neighbours of `(x, y)`.
    #[inline(always)]
    pub fn neighbor_indices(self, x: usize, y: usize) -> [usize; 8] {
        let (left, right) = (self.column_left(x), self.column_right(x));
        let (above, below) = (self.row_above(y), self.row_below(y));
        [
            self.index(left, above),
            self.index(x, above),
            self.index(right, above),
            self.index(left, y),
            self.index(right, y),
            self.index(left, below),
            self.index(x, below),
            self.index(right, below),
        ]
    }
}

/// Zero-filled byte buffer, reporting allocation failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>, LifeError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| LifeError::Allocation { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Per-worker snapshot of the grid taken at the start of a frame.
///
/// The scan reads only this buffer, so toggles applied to the live grid
/// during the same frame cannot influence later decisions.
#[derive(Clone, Debug)]
pub struct Scratch {
    dims: Dims,
    cells: Vec<u8>,
}

impl Scratch {
    pub fn new(dims: Dims) -> Result<Self, LifeError> {
        Ok(Self {
            dims,
            cells: try_zeroed(dims.size())?,
        })
    }

    #[inline]
    pub fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[self.dims.row_span(y)]
    }
}

/// Storage a generation scan can read a snapshot from and write toggles into.
///
/// Implemented by the exclusively owned [`PackedGrid`] and by the
/// shared-segment view used when several workers address one buffer.
pub trait CellStore {
    fn dims(&self) -> Dims;

    /// Copies the whole current generation into `scratch`.
    fn snapshot_into(&self, scratch: &mut Scratch);

    /// Flips `(x, y)` and adjusts its eight neighbour counts.
    fn apply(&mut self, x: usize, y: usize, transition: Transition);

    /// Zeroes a row so it can collect this frame's contributions only.
    fn clear_row(&mut self, y: usize);

    fn copy_row(&self, y: usize) -> Vec<u8>;

    /// Adds `row` byte-wise (wrapping) into row `y`.
    fn merge_row(&mut self, y: usize, row: &[u8]) -> Result<(), LifeError>;

    #[inline]
    fn set_alive(&mut self, x: usize, y: usize) {
        self.apply(x, y, Transition::Birth);
    }

    #[inline]
    fn set_dead(&mut self, x: usize, y: usize) {
        self.apply(x, y, Transition::Death);
    }
}

#[inline]
pub(crate) fn check_row_len(dims: Dims, row: &[u8]) -> Result<(), LifeError> {
    if row.len() != dims.width {
        return Err(LifeError::RowLength {
            expected: dims.width,
            actual: row.len(),
        });
    }
    Ok(())
}

/// An exclusively owned packed grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedGrid {
    dims: Dims,
    cells: Vec<u8>,
}

impl PackedGrid {
    pub fn new(dims: Dims) -> Result<Self, LifeError> {
        Ok(Self {
            dims,
            cells: try_zeroed(dims.size())?,
        })
    }

    /// Builds a grid from an alive set. Coordinates outside the grid are
    /// dropped and duplicates are counted once.
    pub fn with_alive<I>(dims: Dims, alive: I) -> Result<Self, LifeError>
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut grid = Self::new(dims)?;
        for (x, y) in alive {
            if dims.contains(x, y) && !grid.is_alive(x, y) {
                grid.set_alive(x, y);
            }
        }
        Ok(grid)
    }

    /// Wraps raw cell bytes, e.g. rows gathered back from workers.
    pub fn from_bytes(dims: Dims, cells: Vec<u8>) -> Result<Self, LifeError> {
        if cells.len() != dims.size() {
            return Err(LifeError::SegmentSizeMismatch {
                expected: dims.size(),
                actual: cells.len(),
            });
        }
        Ok(Self { dims, cells })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.cells
    }

    #[inline]
    pub fn cell(&self, x: usize, y: usize) -> u8 {
        self.cells[self.dims.index(x, y)]
    }

    #[inline]
    pub fn is_alive(&self, x: usize, y: usize) -> bool {
        cell::is_alive(self.cell(x, y))
    }

    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        &self.cells[self.dims.row_span(y)]
    }

    pub fn population(&self) -> u64 {
        self.cells.iter().filter(|&&c| cell::is_alive(c)).count() as u64
    }

    /// Visits alive cells in row-major order.
    pub fn for_each_live<F: FnMut(usize, usize)>(&self, mut f: F) {
        for (i, &c) in self.cells.iter().enumerate() {
            if cell::is_alive(c) {
                let (x, y) = self.dims.coords(i);
                f(x, y);
            }
        }
    }

    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        self.for_each_live(|x, y| out.push((x, y)));
        out
    }
}

impl CellStore for PackedGrid {
    #[inline]
    fn dims(&self) -> Dims {
        self.dims
    }

    #[inline]
    fn snapshot_into(&self, scratch: &mut Scratch) {
        scratch.as_mut_slice().copy_from_slice(&self.cells);
    }

    #[inline]
    fn apply(&mut self, x: usize, y: usize, transition: Transition) {
        let idx = self.dims.index(x, y);
        match transition {
            Transition::Birth => {
                debug_assert!(!cell::is_alive(self.cells[idx]), "birth on live cell ({x},{y})");
                self.cells[idx] |= cell::ALIVE;
            }
            Transition::Death => {
                debug_assert!(cell::is_alive(self.cells[idx]), "death on dead cell ({x},{y})");
                self.cells[idx] &= !cell::ALIVE;
            }
        }
        let delta = transition.neighbor_delta();
        for n in self.dims.neighbor_indices(x, y) {
            self.cells[n] = self.cells[n].wrapping_add(delta);
        }
    }

    fn clear_row(&mut self, y: usize) {
        let span = self.dims.row_span(y);
        self.cells[span].fill(0);
    }

    fn copy_row(&self, y: usize) -> Vec<u8> {
        self.row(y).to_vec()
    }

    fn merge_row(&mut self, y: usize, row: &[u8]) -> Result<(), LifeError> {
        check_row_len(self.dims, row)?;
        let span = self.dims.row_span(y);
        for (dst, &src) in self.cells[span].iter_mut().zip(row) {
            *dst = dst.wrapping_add(src);
        }
        Ok(())
    }
}
