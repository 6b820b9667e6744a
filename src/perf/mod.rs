//! Named timers with advisory thresholds, plus batched measurement.

pub mod batch;
pub mod tracker;

pub use batch::{BatchMeasure, BatchProgress, DEFAULT_BATCH_SIZE};
pub use tracker::{Metadata, Metric, PerformanceTracker};
