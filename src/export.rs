//! Benchmark sample sinks.
//!
//! A run produces three samples per mode: the whole frame loop under the
//! mode's label, and the compute and communication shares under
//! `<label>_calc` and `<label>_comm`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::error::LifeError;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BenchmarkSample {
    pub method: String,
    pub threads: usize,
    pub frames: u64,
    /// Grid width.
    pub size: usize,
    /// Seconds.
    pub time: f64,
    pub notes: String,
}

pub trait BenchmarkSink {
    fn record(&mut self, sample: &BenchmarkSample) -> Result<(), LifeError>;

    fn record_all(&mut self, samples: &[BenchmarkSample]) -> Result<(), LifeError> {
        for sample in samples {
            self.record(sample)?;
        }
        Ok(())
    }
}

fn append(dir: &Path, file_name: String) -> Result<(PathBuf, fs::File), LifeError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Appends one JSON object per line to `<dir>/<method>.json`.
#[derive(Clone, Debug)]
pub struct JsonExport {
    dir: PathBuf,
}

impl JsonExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BenchmarkSink for JsonExport {
    fn record(&mut self, sample: &BenchmarkSample) -> Result<(), LifeError> {
        let (path, mut file) = append(&self.dir, format!("{}.json", sample.method))?;
        serde_json::to_writer(&mut file, sample)?;
        writeln!(file)?;
        info!(path = %path.display(), method = %sample.method, "exported sample");
        Ok(())
    }
}

/// Appends `"<seconds> <threads>"` lines to `<dir>/<method>.txt`.
#[derive(Clone, Debug)]
pub struct TextExport {
    dir: PathBuf,
}

impl TextExport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl BenchmarkSink for TextExport {
    fn record(&mut self, sample: &BenchmarkSample) -> Result<(), LifeError> {
        let (_, mut file) = append(&self.dir, format!("{}.txt", sample.method))?;
        writeln!(file, "{:.6} {}", sample.time, sample.threads)?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub samples: Vec<BenchmarkSample>,
}

impl BenchmarkSink for MemorySink {
    fn record(&mut self, sample: &BenchmarkSample) -> Result<(), LifeError> {
        self.samples.push(sample.clone());
        Ok(())
    }
}
