use halo_life::reference::{NaiveLife, random_alive_cells};
use halo_life::{Dims, Mode, RunConfig, run};
use rand::SeedableRng;

const PARALLEL_MODES: [Mode; 5] = [
    Mode::Shared,
    Mode::Distributed,
    Mode::LatencyHiding,
    Mode::Hybrid,
    Mode::HybridLatencyHiding,
];

fn seeded(dims: Dims, density: f64, seed: u64) -> Vec<(usize, usize)> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    random_alive_cells(dims, density, &mut rng).unwrap()
}

fn run_bytes(
    dims: Dims,
    frames: u64,
    alive: &[(usize, usize)],
    mode: Mode,
    workers: usize,
) -> Vec<u8> {
    let config = RunConfig::new(dims.width, dims.height, frames)
        .mode(mode)
        .workers(workers);
    run(&config, alive).unwrap().grid.as_bytes().to_vec()
}

fn run_parity_case(size: usize, density: f64, frames: u64, seed: u64) {
    let dims = Dims::new(size, size).unwrap();
    let alive = seeded(dims, density, seed);
    let serial = run_bytes(dims, frames, &alive, Mode::Serial, 1);

    for workers in [2, 4, 8] {
        for mode in PARALLEL_MODES {
            assert_eq!(
                run_bytes(dims, frames, &alive, mode, workers),
                serial,
                "{mode} with {workers} workers diverged (density {density} seed {seed})"
            );
        }
    }
}

#[test]
fn parity_sparse_mid_dense() {
    run_parity_case(32, 0.10, 6, 0xA1);
    run_parity_case(32, 0.42, 6, 0xB2);
    run_parity_case(32, 0.75, 6, 0xC3);
}

#[test]
fn parity_long_run() {
    run_parity_case(48, 0.35, 60, 0xD4);
}

#[test]
fn parity_uneven_partitions() {
    // 37 rows over 4 or 8 workers leaves a remainder for the last worker.
    let dims = Dims::new(29, 37).unwrap();
    let alive = seeded(dims, 0.4, 0xE5);
    let serial = run_bytes(dims, 12, &alive, Mode::Serial, 1);
    for workers in [3, 4, 8] {
        for mode in [Mode::Shared, Mode::Distributed, Mode::LatencyHiding] {
            assert_eq!(run_bytes(dims, 12, &alive, mode, workers), serial, "{mode} x{workers}");
        }
    }
}

#[test]
fn latency_hiding_is_byte_identical_to_distributed() {
    let dims = Dims::new(40, 40).unwrap();
    let alive = seeded(dims, 0.3, 0xF6);
    for workers in [2, 4, 5, 8] {
        assert_eq!(
            run_bytes(dims, 25, &alive, Mode::LatencyHiding, workers),
            run_bytes(dims, 25, &alive, Mode::Distributed, workers),
            "{workers} workers"
        );
    }
}

#[test]
fn matches_naive_oracle() {
    let dims = Dims::new(24, 20).unwrap();
    let alive = seeded(dims, 0.33, 0x0A);
    let frames = 15;
    let mut naive = NaiveLife::new(dims, alive.iter().copied());
    naive.advance(frames);

    for mode in Mode::ALL {
        let config = RunConfig::new(dims.width, dims.height, frames)
            .mode(mode)
            .workers(4);
        let report = run(&config, &alive).unwrap();
        assert_eq!(report.alive_cells(), naive.alive_cells(), "{mode}");
        assert_eq!(report.grid.population(), naive.population(), "{mode}");
    }
}

#[test]
fn hybrid_node_counts_agree() {
    let dims = Dims::new(32, 32).unwrap();
    let alive = seeded(dims, 0.4, 0x1B);
    let serial = run_bytes(dims, 10, &alive, Mode::Serial, 1);
    for (workers, nodes) in [(8, 1), (8, 2), (8, 4), (8, 8), (6, 3)] {
        for mode in [Mode::Hybrid, Mode::HybridLatencyHiding] {
            let config = RunConfig::new(dims.width, dims.height, 10)
                .mode(mode)
                .workers(workers)
                .nodes(nodes);
            let report = run(&config, &alive).unwrap();
            assert_eq!(report.layout.nodes, nodes);
            assert_eq!(report.grid.as_bytes(), serial.as_slice(), "{mode} {workers}/{nodes}");
        }
    }
}
