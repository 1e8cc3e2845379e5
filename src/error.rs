//! Error taxonomy shared by every layer of the simulator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifeError {
    #[error("grid dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("frame count must be positive")]
    InvalidFrameCount,

    #[error("worker count must be positive")]
    InvalidWorkerCount,

    #[error("{workers} workers cannot be split evenly across {nodes} nodes")]
    InvalidNodeLayout { workers: usize, nodes: usize },

    /// Fewer than one full row per worker.
    #[error("{rows} rows cannot be partitioned across {workers} workers")]
    PartitionTooSmall { rows: usize, workers: usize },

    /// A partition would own one of its own halo rows, or both halo rows coincide.
    #[error("partition [{height0}, {height}] leaves no room for distinct halo rows in {rows} rows")]
    HaloOverlap {
        height0: usize,
        height: usize,
        rows: usize,
    },

    #[error("failed to allocate {bytes} bytes of grid storage")]
    Allocation { bytes: usize },

    #[error("shared segment holds {actual} bytes, expected {expected}")]
    SegmentSizeMismatch { expected: usize, actual: usize },

    #[error("malformed Life 1.06 line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },

    #[error("worker {peer} disconnected")]
    PeerDisconnected { peer: usize },

    #[error("boundary row for frame {actual} arrived while merging frame {expected}")]
    FrameMismatch { expected: u64, actual: u64 },

    #[error("boundary row holds {actual} cells, expected {expected}")]
    RowLength { expected: usize, actual: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
