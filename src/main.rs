#[cfg(feature = "mimalloc-global")]
#[global_allocator]
static GLOBAL_ALLOCATOR: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use halo_life::export::{BenchmarkSink, JsonExport, TextExport};
use halo_life::{Dims, Mode, RunConfig, life106, run_layout};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "halo-life")]
#[command(about = "Row-partitioned toroidal Game of Life")]
struct Args {
    /// Grid width in cells
    width: usize,

    /// Grid height in cells
    height: usize,

    /// Number of generations to run
    frames: u64,

    /// Initial state in Life 1.06 format
    input: PathBuf,

    /// Where to write the final state
    output: PathBuf,

    /// Synchronization scheme
    #[arg(long, value_enum, default_value_t = Mode::Distributed)]
    mode: Mode,

    /// Worker count; defaults to HALOLIFE_WORKERS, then the available parallelism
    #[arg(long)]
    workers: Option<usize>,

    /// Node count for the hybrid modes
    #[arg(long)]
    nodes: Option<usize>,

    /// Append timing samples (JSON and text) under this directory
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

impl Args {
    fn run_config(&self) -> RunConfig {
        let mut config = RunConfig::new(self.width, self.height, self.frames).mode(self.mode);
        if let Some(workers) = self.workers {
            config = config.workers(workers);
        }
        if let Some(nodes) = self.nodes {
            config = config.nodes(nodes);
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = args.run_config();
    let layout = config.resolve().context("invalid run configuration")?;

    let alive = life106::read_file(&args.input, layout.dims)
        .with_context(|| format!("reading {}", args.input.display()))?;
    info!(
        input = %args.input.display(),
        alive = alive.len(),
        "loaded initial state"
    );

    let report = run_layout(&layout, &alive)?;
    life106::write_file(&args.output, &report.grid)
        .with_context(|| format!("writing {}", args.output.display()))?;

    let Dims { width, height } = layout.dims;
    info!(
        output = %args.output.display(),
        population = report.grid.population(),
        seconds = report.timings.total.as_secs_f64(),
        "{width}x{height}, {} frames, {} workers",
        layout.frames,
        layout.workers
    );

    if let Some(dir) = &args.export_dir {
        let samples = report.timings.samples(&report.layout);
        JsonExport::new(dir).record_all(&samples)?;
        TextExport::new(dir).record_all(&samples)?;
    }
    Ok(())
}
