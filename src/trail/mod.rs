//! Per-marker position trails: bounded point buffers and their fading map overlays.

pub mod buffer;
pub mod visualizer;

pub use buffer::{PathBuffer, PathPoint};
pub use visualizer::{PathVisualizer, TimeRange, TrailOptions};
