//! Run configuration and its validation.
//!
//! Everything that can be rejected is rejected in [`RunConfig::resolve`],
//! before a single grid buffer is allocated.

use std::fmt;
use std::num::NonZeroUsize;

use clap::ValueEnum;
use tracing::debug;

use crate::error::LifeError;
use crate::grid::Dims;
use crate::partition::{Partition, check_halo_ring, partition_table, sub_partition};

/// Environment variable consulted when no worker count is given.
pub const WORKERS_ENV: &str = "HALOLIFE_WORKERS";

/// How workers share the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum Mode {
    /// One worker, no synchronization.
    #[default]
    Serial,
    /// One grid buffer addressed by every worker.
    Shared,
    /// Private grids; boundary rows exchanged after each scan.
    Distributed,
    /// Private grids; boundary rows sent as soon as they are final.
    LatencyHiding,
    /// Shared segments per node, blocking exchange between nodes.
    Hybrid,
    /// Shared segments per node, overlapped exchange between nodes.
    HybridLatencyHiding,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Serial,
        Mode::Shared,
        Mode::Distributed,
        Mode::LatencyHiding,
        Mode::Hybrid,
        Mode::HybridLatencyHiding,
    ];

    /// Benchmark label; also the stem of the exported sample files.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Serial => "optmzd",
            Mode::Shared => "shrd",
            Mode::Distributed => "dstrb",
            Mode::LatencyHiding => "ltncy",
            Mode::Hybrid => "multi-node",
            Mode::HybridLatencyHiding => "multi-node-ltncy",
        }
    }

    #[inline]
    pub fn is_hybrid(self) -> bool {
        matches!(self, Mode::Hybrid | Mode::HybridLatencyHiding)
    }

    fn name(self) -> &'static str {
        match self {
            Mode::Serial => "serial",
            Mode::Shared => "shared",
            Mode::Distributed => "distributed",
            Mode::LatencyHiding => "latency-hiding",
            Mode::Hybrid => "hybrid",
            Mode::HybridLatencyHiding => "hybrid-latency-hiding",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builder for a run. `None` worker or node counts are chosen automatically.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    width: usize,
    height: usize,
    frames: u64,
    mode: Mode,
    workers: Option<usize>,
    nodes: Option<usize>,
}

impl RunConfig {
    pub fn new(width: usize, height: usize, frames: u64) -> Self {
        Self {
            width,
            height,
            frames,
            mode: Mode::default(),
            workers: None,
            nodes: None,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn nodes(mut self, nodes: usize) -> Self {
        self.nodes = Some(nodes);
        self
    }

    /// Validates the configuration and fixes worker and node counts.
    ///
    /// An automatic worker count is only an upper bound: it steps down until
    /// every partition has a row of its own and room for its halo rows.
    /// Explicit counts are taken as given and rejected when they do not fit.
    pub fn resolve(&self) -> Result<Layout, LifeError> {
        self.resolve_with(workers_from_env())
    }

    /// As [`resolve`](Self::resolve), with the environment's worker count supplied by the caller.
    pub fn resolve_with(&self, env_workers: Option<usize>) -> Result<Layout, LifeError> {
        let dims = Dims::new(self.width, self.height)?;
        if self.frames == 0 {
            return Err(LifeError::InvalidFrameCount);
        }

        match (self.mode, self.workers) {
            (Mode::Serial, _) => self.checked(dims, 1),
            (_, Some(0)) => Err(LifeError::InvalidWorkerCount),
            (_, Some(n)) => self.checked(dims, n),
            (_, None) => {
                let ceiling = env_workers
                    .filter(|&n| n > 0)
                    .or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get))
                    .unwrap_or(1);
                self.fitted(dims, ceiling)
            }
        }
    }

    fn layout(&self, dims: Dims, workers: usize) -> Layout {
        let nodes = if self.mode.is_hybrid() {
            match self.nodes {
                Some(n) => n,
                None if workers >= 2 && workers % 2 == 0 => 2,
                None => 1,
            }
        } else {
            1
        };
        Layout {
            dims,
            frames: self.frames,
            mode: self.mode,
            workers,
            nodes,
        }
    }

    fn checked(&self, dims: Dims, workers: usize) -> Result<Layout, LifeError> {
        let layout = self.layout(dims, workers);
        layout.validate()?;
        Ok(layout)
    }

    /// Largest layout of at most `ceiling` workers that passes validation.
    fn fitted(&self, dims: Dims, ceiling: usize) -> Result<Layout, LifeError> {
        let mut last = LifeError::InvalidWorkerCount;
        for workers in (1..=ceiling.min(dims.height)).rev() {
            match self.checked(dims, workers) {
                Ok(layout) => {
                    if workers < ceiling {
                        debug!(ceiling, workers, "reduced automatic worker count to fit");
                    }
                    return Ok(layout);
                }
                Err(err) => last = err,
            }
        }
        Err(last)
    }
}

fn workers_from_env() -> Option<usize> {
    std::env::var(WORKERS_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// A validated run shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub dims: Dims,
    pub frames: u64,
    pub mode: Mode,
    pub workers: usize,
    pub nodes: usize,
}

impl Layout {
    #[inline]
    pub fn workers_per_node(&self) -> usize {
        self.workers / self.nodes
    }

    /// Owned rows of every worker in rank order.
    pub fn partitions(&self) -> Result<Vec<Partition>, LifeError> {
        if !self.mode.is_hybrid() {
            return partition_table(self.dims, self.workers);
        }
        let per_node = self.workers_per_node();
        let mut table = Vec::with_capacity(self.workers);
        for node in partition_table(self.dims, self.nodes)? {
            for i in 0..per_node {
                table.push(sub_partition(node, self.dims.width, per_node, i)?);
            }
        }
        Ok(table)
    }

    /// Re-checks every precondition [`RunConfig::resolve`] enforces, for
    /// layouts built by hand.
    pub fn validate(&self) -> Result<(), LifeError> {
        Dims::new(self.dims.width, self.dims.height)?;
        if self.frames == 0 {
            return Err(LifeError::InvalidFrameCount);
        }
        if self.workers == 0 {
            return Err(LifeError::InvalidWorkerCount);
        }
        if self.mode.is_hybrid() && (self.nodes == 0 || self.workers % self.nodes != 0) {
            return Err(LifeError::InvalidNodeLayout {
                workers: self.workers,
                nodes: self.nodes,
            });
        }
        match self.mode {
            Mode::Serial | Mode::Shared => {
                self.partitions()?;
            }
            Mode::Distributed | Mode::LatencyHiding => {
                check_halo_ring(self.dims, &self.partitions()?)?;
            }
            Mode::Hybrid | Mode::HybridLatencyHiding => {
                check_halo_ring(self.dims, &partition_table(self.dims, self.nodes)?)?;
                self.partitions()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Layout, Mode, RunConfig};
    use crate::error::LifeError;
    use crate::grid::Dims;
    use crate::partition::Partition;

    #[test]
    fn serial_always_uses_one_worker() {
        let layout = RunConfig::new(8, 8, 1).workers(6).resolve_with(None).unwrap();
        assert_eq!((layout.workers, layout.nodes), (1, 1));
    }

    #[test]
    fn explicit_workers_beat_environment() {
        let cfg = RunConfig::new(16, 4096, 1).mode(Mode::Shared);
        assert_eq!(cfg.clone().workers(3).resolve_with(Some(5)).unwrap().workers, 3);
        assert_eq!(cfg.clone().resolve_with(Some(5)).unwrap().workers, 5);
        assert!(cfg.resolve_with(Some(0)).unwrap().workers >= 1);
    }

    #[test]
    fn automatic_workers_step_down_to_fit_the_grid() {
        let fit = |w, h, mode| {
            RunConfig::new(w, h, 1)
                .mode(mode)
                .resolve_with(Some(8))
                .unwrap()
        };
        assert_eq!(fit(4, 4, Mode::Shared).workers, 4);
        assert_eq!(fit(16, 6, Mode::Distributed).workers, 6);
        assert_eq!(fit(16, 3, Mode::LatencyHiding).workers, 3);
        // Two workers over three rows would share a halo row; one worker exchanges nothing.
        let lone = RunConfig::new(16, 3, 1)
            .mode(Mode::Distributed)
            .resolve_with(Some(2))
            .unwrap();
        assert_eq!(lone.workers, 1);
        let hybrid = fit(16, 6, Mode::Hybrid);
        assert_eq!((hybrid.workers, hybrid.nodes), (6, 2));
        assert_eq!(fit(64, 64, Mode::Distributed).workers, 8);

        let odd_nodes = RunConfig::new(16, 6, 1)
            .mode(Mode::HybridLatencyHiding)
            .nodes(3)
            .resolve_with(Some(8))
            .unwrap();
        assert_eq!((odd_nodes.workers, odd_nodes.nodes), (6, 3));
    }

    #[test]
    fn explicit_workers_are_never_reduced() {
        assert!(matches!(
            RunConfig::new(4, 4, 1)
                .mode(Mode::Shared)
                .workers(8)
                .resolve_with(None),
            Err(LifeError::PartitionTooSmall { rows: 4, workers: 8 })
        ));
        assert!(matches!(
            RunConfig::new(16, 6, 1)
                .mode(Mode::Distributed)
                .workers(7)
                .resolve_with(None),
            Err(LifeError::PartitionTooSmall { rows: 6, workers: 7 })
        ));
    }

    #[test]
    fn hand_built_layout_is_revalidated() {
        let layout = Layout {
            dims: Dims { width: 8, height: 3 },
            frames: 4,
            mode: Mode::Distributed,
            workers: 2,
            nodes: 1,
        };
        assert!(matches!(layout.validate(), Err(LifeError::HaloOverlap { rows: 3, .. })));
        let hybrid = Layout {
            mode: Mode::Hybrid,
            nodes: 3,
            ..layout
        };
        assert!(matches!(
            hybrid.validate(),
            Err(LifeError::InvalidNodeLayout { workers: 2, nodes: 3 })
        ));
        let lone = Layout {
            workers: 1,
            ..layout
        };
        assert!(lone.validate().is_ok());
    }

    #[test]
    fn hybrid_defaults_to_two_nodes_for_even_workers() {
        let cfg = RunConfig::new(16, 16, 1).mode(Mode::Hybrid);
        assert_eq!(cfg.clone().workers(4).resolve_with(None).unwrap().nodes, 2);
        assert_eq!(cfg.clone().workers(3).resolve_with(None).unwrap().nodes, 1);
        assert!(matches!(
            cfg.workers(4).nodes(3).resolve_with(None),
            Err(LifeError::InvalidNodeLayout { workers: 4, nodes: 3 })
        ));
    }

    #[test]
    fn hybrid_partitions_follow_node_split() {
        let layout = RunConfig::new(4, 10, 1)
            .mode(Mode::HybridLatencyHiding)
            .workers(4)
            .nodes(2)
            .resolve_with(None)
            .unwrap();
        assert_eq!(
            layout.partitions().unwrap(),
            vec![
                Partition { height0: 0, height: 1 },
                Partition { height0: 2, height: 4 },
                Partition { height0: 5, height: 6 },
                Partition { height0: 7, height: 9 },
            ]
        );
    }

    #[test]
    fn labels_match_export_names() {
        let labels: Vec<_> = Mode::ALL.iter().map(|m| m.label()).collect();
        assert_eq!(
            labels,
            ["optmzd", "shrd", "dstrb", "ltncy", "multi-node", "multi-node-ltncy"]
        );
        assert_eq!(Mode::LatencyHiding.to_string(), "latency-hiding");
    }
}
