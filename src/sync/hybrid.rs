//! Shared segments inside a node, halo exchange between nodes.
//!
//! Node `k` of `M` owns `partition(dims, M, k)` and splits it among its `K`
//! workers through a [`SharedSegment`]. Only the node's first worker talks to
//! the previous node and only its last worker talks to the next one; the
//! halo rows they exchange are the node's, not their own.

use tracing::debug;

use crate::error::LifeError;
use crate::grid::{CellStore, Dims};
use crate::partition::{Partition, check_halo_ring, partition_table, sub_partition};
use crate::sync::halo::{EdgeLink, pull_row, push_row, ring_links};
use crate::sync::latency::PendingRow;
use crate::sync::shared::{SegmentMember, SharedGridHandle, SharedSegment, segment_group};
use crate::timing::Timings;

/// Everything one hybrid worker needs before its segment is attached.
pub struct HybridSeat {
    pub node: usize,
    pub node_part: Partition,
    pub member: SegmentMember,
    /// Link to the previous node's last worker; first worker of a node only.
    pub upper: Option<EdgeLink>,
    /// Link to the next node's first worker; last worker of a node only.
    pub lower: Option<EdgeLink>,
}

/// Allocates one segment per node and wires the inter-node ring.
///
/// Seats come back in global rank order, `node * per_node + local_rank`.
pub fn hybrid_seats(
    dims: Dims,
    workers: usize,
    nodes: usize,
) -> Result<Vec<HybridSeat>, LifeError> {
    if nodes == 0 || workers == 0 || workers % nodes != 0 {
        return Err(LifeError::InvalidNodeLayout { workers, nodes });
    }
    let per_node = workers / nodes;
    let node_table = partition_table(dims, nodes)?;
    check_halo_ring(dims, &node_table)?;
    for &node_part in &node_table {
        for i in 0..per_node {
            sub_partition(node_part, dims.width, per_node, i)?;
        }
    }

    let mut seats = Vec::with_capacity(workers);
    let ring = ring_links(nodes).into_iter().zip(node_table);
    for (node, (links, node_part)) in ring.enumerate() {
        let handle = SharedGridHandle::allocate(dims)?;
        let (mut upper, mut lower) = match links {
            Some(links) => {
                let upper_rank = links.upper.peer() * per_node + per_node - 1;
                let lower_rank = links.lower.peer() * per_node;
                (
                    Some(links.upper.with_peer(upper_rank)),
                    Some(links.lower.with_peer(lower_rank)),
                )
            }
            None => (None, None),
        };
        for member in segment_group(handle, per_node) {
            let local = member.local_rank();
            seats.push(HybridSeat {
                node,
                node_part,
                member,
                upper: if local == 0 { upper.take() } else { None },
                lower: if local == per_node - 1 { lower.take() } else { None },
            });
        }
    }
    Ok(seats)
}

/// A hybrid worker's frame loop.
pub struct HybridCoordinator {
    segment: SharedSegment,
    store: SharedGridHandle,
    node: Partition,
    upper: Option<EdgeLink>,
    lower: Option<EdgeLink>,
    overlap: bool,
}

impl HybridCoordinator {
    /// Attaches the seat's segment. The node leader loads `alive` and hands
    /// every member its share of the node's rows.
    pub fn establish(
        seat: HybridSeat,
        alive: &[(usize, usize)],
        per_node: usize,
        overlap: bool,
    ) -> Result<Self, LifeError> {
        let HybridSeat {
            node,
            node_part,
            member,
            upper,
            lower,
        } = seat;
        let width = member.dims().width;
        let segment = member.establish(alive, || {
            (0..per_node)
                .map(|i| sub_partition(node_part, width, per_node, i))
                .collect()
        })?;
        debug!(
            node,
            local_rank = segment.local_rank(),
            boundary_up = upper.is_some(),
            boundary_down = lower.is_some(),
            "hybrid worker ready"
        );
        Ok(Self {
            store: segment.store().clone(),
            segment,
            node: node_part,
            upper,
            lower,
            overlap,
        })
    }

    #[inline]
    pub fn partition(&self) -> Partition {
        self.segment.partition()
    }

    pub fn advance(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        if self.overlap {
            self.advance_overlapped(frame, timings)
        } else {
            self.advance_blocking(frame, timings)
        }
    }

    fn clear_halos(&mut self) {
        let dims = self.store.dims();
        if self.upper.is_some() {
            self.store.clear_row(self.node.halo_top(dims));
        }
        if self.lower.is_some() {
            self.store.clear_row(self.node.halo_bottom(dims));
        }
    }

    fn advance_blocking(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        self.segment.begin_frame(timings);
        timings.compute(|| self.clear_halos());
        for y in self.segment.partition().rows() {
            self.segment.scan_row(y, timings);
        }
        self.segment.sync(timings);

        let dims = self.store.dims();
        let node = self.node;
        let store = &mut self.store;
        let (upper, lower) = (&self.upper, &self.lower);
        timings.communicate(|| -> Result<(), LifeError> {
            if let Some(link) = upper {
                push_row(&*store, link, frame, node.halo_top(dims))?;
            }
            if let Some(link) = lower {
                push_row(&*store, link, frame, node.halo_bottom(dims))?;
            }
            if let Some(link) = upper {
                pull_row(store, link, frame, node.height0)?;
            }
            if let Some(link) = lower {
                pull_row(store, link, frame, node.height)?;
            }
            Ok(())
        })?;

        self.segment.sync(timings);
        Ok(())
    }

    fn advance_overlapped(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        self.segment.begin_frame(timings);
        timings.compute(|| self.clear_halos());

        let dims = self.store.dims();
        let node = self.node;
        let part = self.segment.partition();
        let (upper, lower) = (&self.upper, &self.lower);
        let mut from_prev = upper.as_ref().map(|link| PendingRow::post(link, frame, node.height0));
        let mut from_next = lower.as_ref().map(|link| PendingRow::post(link, frame, node.height));

        for y in part.rows() {
            self.segment.scan_row(y, timings);
            let store = &mut self.store;
            timings.communicate(|| -> Result<(), LifeError> {
                if let Some(link) = upper.as_ref().filter(|_| y == node.height0) {
                    push_row(&*store, link, frame, node.halo_top(dims))?;
                }
                if let Some(link) = lower.as_ref().filter(|_| y == node.height) {
                    push_row(&*store, link, frame, node.halo_bottom(dims))?;
                }
                for pending in [&mut from_prev, &mut from_next].into_iter().flatten() {
                    pending.poll(store)?;
                }
                Ok(())
            })?;
        }

        let store = &mut self.store;
        timings.communicate(|| -> Result<(), LifeError> {
            for pending in [&mut from_prev, &mut from_next].into_iter().flatten() {
                pending.wait(store)?;
            }
            Ok(())
        })?;

        self.segment.sync(timings);
        Ok(())
    }

    pub fn owned_rows(&self) -> Vec<u8> {
        self.segment.owned_rows()
    }
}
