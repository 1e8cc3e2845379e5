//! Per-worker wall-clock accounting split into compute and communication.

use std::time::{Duration, Instant};

use crate::config::Layout;
use crate::export::BenchmarkSample;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Timings {
    /// Whole frame loop.
    pub total: Duration,
    /// Snapshot copies and row scans.
    pub compute: Duration,
    /// Boundary exchange, merges and barrier waits.
    pub communication: Duration,
}

impl Timings {
    #[inline]
    pub fn compute<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.compute += start.elapsed();
        out
    }

    #[inline]
    pub fn communicate<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.communication += start.elapsed();
        out
    }

    /// Total, compute and communication samples for a finished run.
    pub fn samples(&self, layout: &Layout) -> [BenchmarkSample; 3] {
        let label = layout.mode.label();
        let sample = |method: String, time: Duration| BenchmarkSample {
            method,
            threads: layout.workers,
            frames: layout.frames,
            size: layout.dims.width,
            time: time.as_secs_f64(),
            notes: "time in seconds".to_owned(),
        };
        [
            sample(label.to_owned(), self.total),
            sample(format!("{label}_calc"), self.compute),
            sample(format!("{label}_comm"), self.communication),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::Timings;

    #[test]
    fn closures_accumulate_into_their_bucket() {
        let mut timings = Timings::default();
        let value = timings.compute(|| 7);
        timings.communicate(|| thread::sleep(Duration::from_millis(2)));
        timings.communicate(|| thread::sleep(Duration::from_millis(2)));
        assert_eq!(value, 7);
        assert!(timings.communication >= Duration::from_millis(4));
        assert!(timings.compute < timings.communication);
        assert_eq!(timings.total, Duration::ZERO);
    }
}
