//! Row-partitioned Conway's Game of Life (B3/S23) on a torus.
//!
//! Cells are packed into one byte each (alive flag plus neighbour count)
//! and updated incrementally. The grid is split into row ranges owned by
//! workers that synchronize through a shared segment, a halo exchange
//! ring, or both.

pub mod config;
pub mod error;
pub mod export;
pub mod grid;
pub mod life106;
pub mod partition;
pub mod reference;
pub mod runner;
pub mod step;
pub mod sync;
pub mod timing;

pub use config::{Layout, Mode, RunConfig};
pub use error::LifeError;
pub use export::{BenchmarkSample, BenchmarkSink, JsonExport, MemorySink, TextExport};
pub use grid::{CellStore, Dims, PackedGrid, Scratch};
pub use partition::{Partition, partition};
pub use reference::NaiveLife;
pub use runner::{RunReport, run, run_layout, run_mode};
pub use timing::Timings;
