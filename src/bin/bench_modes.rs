#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::time::Instant;

use halo_life::reference::random_alive_cells;
use halo_life::{Dims, LifeError, Mode, RunConfig, run};
use rand::SeedableRng;

const DENSITY: f64 = 0.42;

fn main() -> Result<(), LifeError> {
    let workers = std::thread::available_parallelism().map_or(4, |n| n.get().clamp(2, 8));
    let workers = workers - workers % 2;
    let scales: &[(usize, u64)] = &[(256, 200), (512, 100), (1024, 50), (2048, 20)];

    println!(
        "{:<10} {:<22} {:>7} {:>12} {:>12} {:>12} {:>10}",
        "Grid", "Mode", "Workers", "Total(ms)", "Calc(ms)", "Comm(ms)", "Pop"
    );
    println!("{}", "-".repeat(91));

    for &(size, frames) in scales {
        let dims = Dims::new(size, size)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5EED_1234_ABCD_EF01);
        let alive = random_alive_cells(dims, DENSITY, &mut rng)?;

        let mut serial_pop = None;
        for mode in Mode::ALL {
            let config = RunConfig::new(size, size, frames).mode(mode).workers(workers);
            let start = Instant::now();
            let report = run(&config, &alive)?;
            let wall_ms = start.elapsed().as_secs_f64() * 1000.0;

            let pop = report.grid.population();
            let status = match serial_pop {
                None => {
                    serial_pop = Some(pop);
                    ""
                }
                Some(expected) if expected == pop => "",
                Some(_) => " MISMATCH",
            };
            println!(
                "{:<10} {:<22} {:>7} {:>12.1} {:>12.1} {:>12.1} {:>10}{}",
                format!("{size}x{size}"),
                mode.to_string(),
                report.layout.workers,
                wall_ms,
                report.timings.compute.as_secs_f64() * 1000.0,
                report.timings.communication.as_secs_f64() * 1000.0,
                pop,
                status
            );
        }
    }
    Ok(())
}
