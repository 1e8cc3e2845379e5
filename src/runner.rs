//! Worker entry point: builds every rank's state, runs the frame loop on a
//! dedicated pool and stitches the owned rows back into one grid.

use std::sync::{Arc, Barrier};
use std::time::Instant;

use tracing::{debug, info};

use crate::config::{Layout, Mode, RunConfig};
use crate::error::LifeError;
use crate::grid::{PackedGrid, Scratch, try_zeroed};
use crate::partition::Partition;
use crate::step;
use crate::sync::halo::{HaloExchange, ring_links};
use crate::sync::hybrid::{HybridCoordinator, HybridSeat, hybrid_seats};
use crate::sync::latency::LatencyHidingExchange;
use crate::sync::shared::{SegmentMember, SharedGridHandle, SharedSegment, segment_group};
use crate::timing::Timings;

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub layout: Layout,
    /// Final generation, byte-identical across modes.
    pub grid: PackedGrid,
    /// Rank 0's timings.
    pub timings: Timings,
}

impl RunReport {
    #[inline]
    pub fn alive_cells(&self) -> Vec<(usize, usize)> {
        self.grid.alive_cells()
    }
}

/// Runs `frames` generations of `alive` as described by `config`.
pub fn run(config: &RunConfig, alive: &[(usize, usize)]) -> Result<RunReport, LifeError> {
    let layout = config.resolve()?;
    run_layout(&layout, alive)
}

/// Final alive set after `frames` generations, with worker counts chosen automatically.
pub fn run_mode(
    width: usize,
    height: usize,
    frames: u64,
    alive: &[(usize, usize)],
    mode: Mode,
) -> Result<Vec<(usize, usize)>, LifeError> {
    let report = run(&RunConfig::new(width, height, frames).mode(mode), alive)?;
    Ok(report.alive_cells())
}

/// Runs a layout directly. Hand-built layouts are validated like resolved ones.
pub fn run_layout(layout: &Layout, alive: &[(usize, usize)]) -> Result<RunReport, LifeError> {
    layout.validate()?;
    info!(
        mode = %layout.mode,
        width = layout.dims.width,
        height = layout.dims.height,
        frames = layout.frames,
        workers = layout.workers,
        nodes = layout.nodes,
        "starting run"
    );
    let start = Instant::now();

    let (grid, timings) = match layout.mode {
        Mode::Serial => run_serial(layout, alive)?,
        _ => run_parallel(layout, alive)?,
    };

    info!(
        mode = %layout.mode,
        elapsed_ms = start.elapsed().as_millis() as u64,
        compute_ms = timings.compute.as_millis() as u64,
        communication_ms = timings.communication.as_millis() as u64,
        population = grid.population(),
        "run finished"
    );
    Ok(RunReport {
        layout: *layout,
        grid,
        timings,
    })
}

fn run_serial(
    layout: &Layout,
    alive: &[(usize, usize)],
) -> Result<(PackedGrid, Timings), LifeError> {
    let dims = layout.dims;
    let mut grid = PackedGrid::with_alive(dims, alive.iter().copied())?;
    let mut scratch = Scratch::new(dims)?;
    let whole = Partition {
        height0: 0,
        height: dims.height - 1,
    };

    let mut timings = Timings::default();
    let start = Instant::now();
    for _ in 0..layout.frames {
        timings.compute(|| step::advance(&mut grid, &mut scratch, whole));
    }
    timings.total = start.elapsed();
    Ok((grid, timings))
}

/// A rank's state before its frame loop starts.
enum Seat {
    Shared(SegmentMember),
    Halo(HaloExchange),
    LatencyHiding(LatencyHidingExchange),
    Hybrid(HybridSeat),
}

/// A rank's frame loop, whatever the synchronization scheme.
enum Worker {
    Shared(SharedSegment),
    Halo(HaloExchange),
    LatencyHiding(LatencyHidingExchange),
    Hybrid(HybridCoordinator),
}

struct WorkerOutput {
    part: Partition,
    rows: Vec<u8>,
    timings: Timings,
}

fn build_seats(layout: &Layout, alive: &[(usize, usize)]) -> Result<Vec<Seat>, LifeError> {
    let dims = layout.dims;
    let workers = layout.workers;
    match layout.mode {
        Mode::Serial => Ok(Vec::new()),
        Mode::Shared => {
            let handle = SharedGridHandle::allocate(dims)?;
            Ok(segment_group(handle, workers)
                .into_iter()
                .map(Seat::Shared)
                .collect())
        }
        Mode::Distributed | Mode::LatencyHiding => {
            let initial = PackedGrid::with_alive(dims, alive.iter().copied())?;
            let barrier = Arc::new(Barrier::new(workers));
            layout
                .partitions()?
                .into_iter()
                .zip(ring_links(workers))
                .map(|(part, links)| {
                    let halo =
                        HaloExchange::new(initial.clone(), part, links, Arc::clone(&barrier))?;
                    Ok(if layout.mode == Mode::LatencyHiding {
                        Seat::LatencyHiding(LatencyHidingExchange::new(halo))
                    } else {
                        Seat::Halo(halo)
                    })
                })
                .collect()
        }
        Mode::Hybrid | Mode::HybridLatencyHiding => Ok(hybrid_seats(dims, workers, layout.nodes)?
            .into_iter()
            .map(Seat::Hybrid)
            .collect()),
    }
}

impl Seat {
    fn attach(self, layout: &Layout, alive: &[(usize, usize)]) -> Result<Worker, LifeError> {
        Ok(match self {
            Seat::Shared(member) => {
                Worker::Shared(member.establish(alive, || layout.partitions())?)
            }
            Seat::Halo(halo) => Worker::Halo(halo),
            Seat::LatencyHiding(latency) => Worker::LatencyHiding(latency),
            Seat::Hybrid(seat) => Worker::Hybrid(HybridCoordinator::establish(
                seat,
                alive,
                layout.workers_per_node(),
                layout.mode == Mode::HybridLatencyHiding,
            )?),
        })
    }
}

impl Worker {
    fn partition(&self) -> Partition {
        match self {
            Worker::Shared(w) => w.partition(),
            Worker::Halo(w) => w.partition(),
            Worker::LatencyHiding(w) => w.partition(),
            Worker::Hybrid(w) => w.partition(),
        }
    }

    fn advance(&mut self, frame: u64, timings: &mut Timings) -> Result<(), LifeError> {
        match self {
            Worker::Shared(w) => {
                w.advance(timings);
                Ok(())
            }
            Worker::Halo(w) => w.advance(frame, timings),
            Worker::LatencyHiding(w) => w.advance(frame, timings),
            Worker::Hybrid(w) => w.advance(frame, timings),
        }
    }

    fn owned_rows(&self) -> Vec<u8> {
        match self {
            Worker::Shared(w) => w.owned_rows(),
            Worker::Halo(w) => w.owned_rows(),
            Worker::LatencyHiding(w) => w.owned_rows(),
            Worker::Hybrid(w) => w.owned_rows(),
        }
    }
}

fn drive(
    rank: usize,
    seat: Seat,
    layout: &Layout,
    alive: &[(usize, usize)],
) -> Result<WorkerOutput, LifeError> {
    let mut worker = seat.attach(layout, alive)?;
    let part = worker.partition();
    debug!(rank, height0 = part.height0, height = part.height, "worker assigned");

    let mut timings = Timings::default();
    let start = Instant::now();
    for frame in 0..layout.frames {
        worker.advance(frame, &mut timings)?;
    }
    timings.total = start.elapsed();

    Ok(WorkerOutput {
        part,
        rows: worker.owned_rows(),
        timings,
    })
}

fn run_parallel(
    layout: &Layout,
    alive: &[(usize, usize)],
) -> Result<(PackedGrid, Timings), LifeError> {
    let seats = build_seats(layout, alive)?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(layout.workers)
        .thread_name(|i| format!("life-worker-{i}"))
        .build()?;

    let mut results: Vec<Option<Result<WorkerOutput, LifeError>>> =
        (0..layout.workers).map(|_| None).collect();
    pool.scope(|s| {
        for (rank, (seat, slot)) in seats.into_iter().zip(results.iter_mut()).enumerate() {
            s.spawn(move |_| *slot = Some(drive(rank, seat, layout, alive)));
        }
    });

    let mut outputs = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Some(Ok(output)) => outputs.push(output),
            Some(Err(err)) => errors.push(err),
            None => errors.push(LifeError::PeerDisconnected { peer: rank }),
        }
    }
    if let Some(err) = first_cause(errors) {
        return Err(err);
    }

    let timings = outputs.first().map(|o| o.timings).unwrap_or_default();
    Ok((stitch(layout, outputs)?, timings))
}

/// Picks the error that started a failure cascade over the disconnects it caused.
fn first_cause(errors: Vec<LifeError>) -> Option<LifeError> {
    let root = errors
        .iter()
        .position(|e| !matches!(e, LifeError::PeerDisconnected { .. }));
    let mut errors = errors;
    match root {
        Some(i) => Some(errors.swap_remove(i)),
        None => errors.into_iter().next(),
    }
}

fn stitch(layout: &Layout, outputs: Vec<WorkerOutput>) -> Result<PackedGrid, LifeError> {
    let dims = layout.dims;
    let mut cells = try_zeroed(dims.size())?;
    let mut covered = 0;
    for output in outputs {
        let span = output.part.byte_span(dims);
        if output.rows.len() != span.len() {
            return Err(LifeError::SegmentSizeMismatch {
                expected: span.len(),
                actual: output.rows.len(),
            });
        }
        covered += span.len();
        cells[span].copy_from_slice(&output.rows);
    }
    if covered != dims.size() {
        return Err(LifeError::SegmentSizeMismatch {
            expected: dims.size(),
            actual: covered,
        });
    }
    PackedGrid::from_bytes(dims, cells)
}

#[cfg(test)]
mod tests {
    use super::{first_cause, run, run_layout};
    use crate::config::{Layout, Mode, RunConfig};
    use crate::error::LifeError;
    use crate::grid::Dims;

    #[test]
    fn root_cause_wins_over_disconnects() {
        let picked = first_cause(vec![
            LifeError::PeerDisconnected { peer: 1 },
            LifeError::FrameMismatch { expected: 2, actual: 1 },
        ]);
        assert!(matches!(picked, Some(LifeError::FrameMismatch { .. })));
        assert!(first_cause(Vec::new()).is_none());
    }

    #[test]
    fn hand_built_layout_cannot_overlap_halo_rows() {
        let layout = Layout {
            dims: Dims::new(8, 3).unwrap(),
            frames: 4,
            mode: Mode::Distributed,
            workers: 2,
            nodes: 1,
        };
        let blinker = [(2, 1), (3, 1), (4, 1)];
        assert!(matches!(
            run_layout(&layout, &blinker),
            Err(LifeError::HaloOverlap { rows: 3, .. })
        ));
        assert!(matches!(
            run_layout(
                &Layout {
                    mode: Mode::Hybrid,
                    nodes: 2,
                    ..layout
                },
                &blinker
            ),
            Err(LifeError::HaloOverlap { .. })
        ));

        let single_layout = Layout {
            workers: 1,
            ..layout
        };
        let single = run_layout(&single_layout, &blinker).unwrap();
        let serial_layout = Layout {
            mode: Mode::Serial,
            workers: 1,
            ..layout
        };
        let serial = run_layout(&serial_layout, &blinker).unwrap();
        assert_eq!(single.grid, serial.grid);
    }

    #[test]
    fn report_carries_resolved_layout() {
        let cfg = RunConfig::new(12, 12, 3).mode(Mode::Distributed).workers(3);
        let report = run(&cfg, &[(1, 1), (2, 1), (1, 2), (2, 2)]).unwrap();
        assert_eq!(report.layout.workers, 3);
        assert_eq!(report.alive_cells(), vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
        assert!(report.timings.total >= report.timings.compute);
    }
}
