//! Row-range partitioning and ring topology.
//!
//! Every worker recomputes the same table from `(dims, workers)`, so the
//! functions here must stay pure and deterministic.

use std::ops::RangeInclusive;

use crate::error::LifeError;
use crate::grid::Dims;

/// Contiguous, column-complete row range `[height0, height]` (inclusive).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Partition {
    pub height0: usize,
    pub height: usize,
}

impl Partition {
    #[inline]
    pub fn rows(self) -> RangeInclusive<usize> {
        self.height0..=self.height
    }

    #[inline]
    pub fn row_count(self) -> usize {
        self.height - self.height0 + 1
    }

    #[inline]
    pub fn contains(self, y: usize) -> bool {
        self.height0 <= y && y <= self.height
    }

    /// Row above the first owned row; receives spill from toggles in `height0`.
    #[inline]
    pub fn halo_top(self, dims: Dims) -> usize {
        dims.row_above(self.height0)
    }

    /// Row below the last owned row; receives spill from toggles in `height`.
    #[inline]
    pub fn halo_bottom(self, dims: Dims) -> usize {
        dims.row_below(self.height)
    }

    /// Byte range of the owned rows in a flat `dims`-shaped buffer.
    #[inline]
    pub fn byte_span(self, dims: Dims) -> std::ops::Range<usize> {
        dims.index(0, self.height0)..dims.index(0, self.height) + dims.width
    }
}

/// Owned rows of worker `index` out of `workers` over `rows` rows of `width` cells.
///
/// `rows_per_worker = floor(floor(width * rows / workers) / width)`; the
/// last worker absorbs the remainder.
fn split_rows(
    width: usize,
    rows: usize,
    workers: usize,
    index: usize,
) -> Result<Partition, LifeError> {
    if workers == 0 || index >= workers {
        return Err(LifeError::InvalidWorkerCount);
    }
    if width == 0 || rows == 0 {
        return Err(LifeError::InvalidDimensions {
            width,
            height: rows,
        });
    }
    let cells_per_worker = (width * rows) / workers;
    let rows_per_worker = cells_per_worker / width;
    if rows_per_worker == 0 {
        return Err(LifeError::PartitionTooSmall { rows, workers });
    }
    let height0 = index * rows_per_worker;
    let height = if index == workers - 1 {
        rows - 1
    } else {
        (index + 1) * rows_per_worker - 1
    };
    Ok(Partition { height0, height })
}

/// Partition of worker `index` among `workers` over the whole grid.
pub fn partition(dims: Dims, workers: usize, index: usize) -> Result<Partition, LifeError> {
    split_rows(dims.width, dims.height, workers, index)
}

/// Partitions for every worker, in rank order.
pub fn partition_table(dims: Dims, workers: usize) -> Result<Vec<Partition>, LifeError> {
    (0..workers).map(|i| partition(dims, workers, i)).collect()
}

/// Splits an enclosing partition (a node's rows) among `workers` local workers.
pub fn sub_partition(
    outer: Partition,
    width: usize,
    workers: usize,
    index: usize,
) -> Result<Partition, LifeError> {
    let local = split_rows(width, outer.row_count(), workers, index)?;
    Ok(Partition {
        height0: outer.height0 + local.height0,
        height: outer.height0 + local.height,
    })
}

/// `(prev, next)` ranks of `rank` on a ring of `workers`.
#[inline]
pub fn ring_neighbors(rank: usize, workers: usize) -> (usize, usize) {
    let prev = if rank == 0 { workers - 1 } else { rank - 1 };
    let next = if rank == workers - 1 { 0 } else { rank + 1 };
    (prev, next)
}

/// Checks that every partition on a ring of two or more members has two
/// distinct halo rows outside its own range. A ring of one exchanges nothing.
pub fn check_halo_ring(dims: Dims, table: &[Partition]) -> Result<(), LifeError> {
    if table.len() < 2 {
        return Ok(());
    }
    for part in table {
        if dims.height < part.row_count() + 2 {
            return Err(LifeError::HaloOverlap {
                height0: part.height0,
                height: part.height,
                rows: dims.height,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        Partition, check_halo_ring, partition, partition_table, ring_neighbors, sub_partition,
    };
    use crate::grid::Dims;

    fn assert_covers(dims: Dims, table: &[Partition]) {
        let mut next_row = 0;
        for part in table {
            assert_eq!(part.height0, next_row, "gap or overlap before {part:?} in {dims:?}");
            assert!(part.height >= part.height0);
            next_row = part.height + 1;
        }
        assert_eq!(next_row, dims.height, "table does not reach the last row of {dims:?}");
    }

    #[test]
    fn partitions_cover_all_rows_without_overlap() {
        for width in [1usize, 3, 8, 17] {
            for height in 1usize..=40 {
                for workers in 1usize..=height {
                    let dims = Dims::new(width, height).unwrap();
                    let table = partition_table(dims, workers).unwrap();
                    assert_eq!(table.len(), workers);
                    assert_covers(dims, &table);
                }
            }
        }
    }

    #[test]
    fn last_worker_absorbs_remainder() {
        let dims = Dims::new(10, 10).unwrap();
        let table = partition_table(dims, 3).unwrap();
        assert_eq!(
            table,
            vec![
                Partition { height0: 0, height: 2 },
                Partition { height0: 3, height: 5 },
                Partition { height0: 6, height: 9 },
            ]
        );
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let dims = Dims::new(4, 4).unwrap();
        assert!(partition(dims, 0, 0).is_err());
        assert!(partition(dims, 2, 2).is_err());
        assert!(partition(dims, 5, 0).is_err());
    }

    #[test]
    fn ring_wraps_both_ends() {
        assert_eq!(ring_neighbors(0, 4), (3, 1));
        assert_eq!(ring_neighbors(3, 4), (2, 0));
        assert_eq!(ring_neighbors(0, 2), (1, 1));
        assert_eq!(ring_neighbors(0, 1), (0, 0));
    }

    #[test]
    fn halo_rows_wrap_around_the_torus() {
        let dims = Dims::new(4, 8).unwrap();
        let first = partition(dims, 2, 0).unwrap();
        let last = partition(dims, 2, 1).unwrap();
        assert_eq!((first.halo_top(dims), first.halo_bottom(dims)), (7, 4));
        assert_eq!((last.halo_top(dims), last.halo_bottom(dims)), (3, 0));
    }

    #[test]
    fn sub_partitions_tile_their_node() {
        let dims = Dims::new(8, 32).unwrap();
        for node in 0..2 {
            let outer = partition(dims, 2, node).unwrap();
            let inner: Vec<_> = (0..4)
                .map(|i| sub_partition(outer, dims.width, 4, i).unwrap())
                .collect();
            assert_eq!(inner.first().unwrap().height0, outer.height0);
            assert_eq!(inner.last().unwrap().height, outer.height);
            for pair in inner.windows(2) {
                assert_eq!(pair[0].height + 1, pair[1].height0);
            }
        }
    }

    #[test]
    fn halo_ring_needs_two_free_rows() {
        let tight = Dims::new(4, 3).unwrap();
        assert!(check_halo_ring(tight, &partition_table(tight, 2).unwrap()).is_err());
        let ok = Dims::new(4, 4).unwrap();
        assert!(check_halo_ring(ok, &partition_table(ok, 2).unwrap()).is_ok());
        assert!(check_halo_ring(tight, &partition_table(tight, 1).unwrap()).is_ok());
    }
}
