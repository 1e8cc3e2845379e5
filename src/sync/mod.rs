//! Frame synchronization schemes.
//!
//! - [`shared`]: one grid buffer per group, barriers only.
//! - [`halo`]: private grids, boundary rows exchanged over a ring after each scan.
//! - [`latency`]: as `halo`, with sends issued as soon as a boundary row is final.
//! - [`hybrid`]: shared segments per node, halo exchange between nodes.

pub mod halo;
pub mod hybrid;
pub mod latency;
pub mod shared;

pub use halo::{BoundaryRow, EdgeLink, HaloExchange, RingLinks, ring_links};
pub use hybrid::{HybridCoordinator, HybridSeat, hybrid_seats};
pub use latency::LatencyHidingExchange;
pub use shared::{GridMeta, SegmentMember, SharedGridHandle, SharedSegment, segment_group};
