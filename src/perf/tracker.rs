use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::clock::Clock;
use crate::perf::batch::{BatchMeasure, DEFAULT_BATCH_SIZE};

/// Free-form annotations attached to a metric.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// One named measurement.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub name: String,
    pub start_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub metadata: Metadata,
}

impl Metric {
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

#[derive(Debug, Default)]
struct PerfState {
    metrics: HashMap<String, Metric>,
    thresholds: HashMap<String, f64>,
}

/// Named start/end timers with advisory per-name thresholds.
///
/// Thread-safe: batch items run on the rayon pool while the tracker records batch timings.
pub struct PerformanceTracker {
    clock: Arc<dyn Clock>,
    state: Mutex<PerfState>,
}

impl PerformanceTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(PerfState::default()),
        }
    }

    pub fn with_thresholds<I, S>(clock: Arc<dyn Clock>, thresholds: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let tracker = Self::new(clock);
        for (name, ms) in thresholds {
            tracker.set_threshold(name, ms);
        }
        tracker
    }

    fn state(&self) -> MutexGuard<'_, PerfState> {
        // A panicking measured op must not take the tracker down with it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin (or restart) the measurement called `name`.
    pub fn start(&self, name: &str, metadata: Option<Metadata>) {
        let metric = Metric {
            name: name.to_owned(),
            start_time: self.clock.now_ms(),
            end_time: None,
            duration: None,
            metadata: metadata.unwrap_or_default(),
        };
        tracing::debug!(metric = name, metadata = ?metric.metadata, "starting measurement");
        self.state().metrics.insert(name.to_owned(), metric);
    }

    /// Finish the measurement called `name` and return its duration in milliseconds.
    ///
    /// Unknown or already finished names are logged and yield `None`.
    pub fn end(&self, name: &str, metadata: Option<Metadata>) -> Option<f64> {
        let end_time = self.clock.now_ms();
        let (finished, threshold) = {
            let mut state = self.state();
            let threshold = state.thresholds.get(name).copied();
            let Some(metric) = state.metrics.get_mut(name) else {
                drop(state);
                tracing::warn!(metric = name, "no measurement found");
                return None;
            };
            if metric.is_finished() {
                drop(state);
                tracing::warn!(metric = name, "measurement already finished");
                return None;
            }
            metric.end_time = Some(end_time);
            metric.duration = Some(end_time - metric.start_time);
            if let Some(extra) = metadata {
                metric.metadata.extend(extra);
            }
            (metric.clone(), threshold)
        };

        let duration = end_time - finished.start_time;
        match threshold {
            Some(limit) if duration > limit => tracing::warn!(
                metric = name,
                duration_ms = format_args!("{duration:.2}"),
                threshold_ms = limit,
                metadata = ?finished.metadata,
                "performance threshold exceeded"
            ),
            _ => tracing::debug!(
                metric = name,
                duration_ms = format_args!("{duration:.2}"),
                metadata = ?finished.metadata,
                "measurement complete"
            ),
        }
        Some(duration)
    }

    pub fn set_threshold(&self, name: impl Into<String>, ms: f64) {
        self.state().thresholds.insert(name.into(), ms);
    }

    pub fn threshold(&self, name: &str) -> Option<f64> {
        self.state().thresholds.get(name).copied()
    }

    pub fn metric(&self, name: &str) -> Option<Metric> {
        self.state().metrics.get(name).cloned()
    }

    /// Every recorded metric, oldest start first.
    pub fn metrics(&self) -> Vec<Metric> {
        let mut out: Vec<Metric> = self.state().metrics.values().cloned().collect();
        out.sort_by(|a, b| {
            a.start_time
                .total_cmp(&b.start_time)
                .then_with(|| a.name.cmp(&b.name))
        });
        out
    }

    pub fn clear(&self) {
        self.state().metrics.clear();
    }

    /// Time an asynchronous operation. `end` runs exactly once whether it succeeds or fails;
    /// a failure is recorded under the `error` metadata key and handed back unchanged.
    pub async fn measure<T, E, F, Fut>(
        &self,
        name: &str,
        op: F,
        metadata: Option<Metadata>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.start(name, metadata);
        let result = op().await;
        self.finish_measure(name, &result);
        result
    }

    /// Blocking twin of [`PerformanceTracker::measure`].
    pub fn measure_sync<T, E, F>(&self, name: &str, op: F, metadata: Option<Metadata>) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        self.start(name, metadata);
        let result = op();
        self.finish_measure(name, &result);
        result
    }

    fn finish_measure<T, E: Display>(&self, name: &str, result: &Result<T, E>) {
        match result {
            Ok(_) => {
                self.end(name, None);
            }
            Err(err) => {
                self.end(name, Some(error_metadata(err)));
            }
        }
    }

    /// Run `op` over `items` in batches of `batch_size`, items of one batch concurrently.
    ///
    /// The returned iterator does the work lazily: each `next()` runs one batch and yields
    /// its timing. A failing item ends the sequence after yielding the error.
    pub fn batch_measure<'a, T, E, F>(
        &'a self,
        name: &str,
        items: &'a [T],
        op: F,
        batch_size: usize,
    ) -> BatchMeasure<'a, T, F, E>
    where
        T: Sync,
        E: Send + Display,
        F: Fn(&T) -> Result<(), E> + Sync,
    {
        BatchMeasure::new(self, name, items, op, batch_size)
    }

    /// [`PerformanceTracker::batch_measure`] with the default batch size.
    pub fn batch_measure_default<'a, T, E, F>(
        &'a self,
        name: &str,
        items: &'a [T],
        op: F,
    ) -> BatchMeasure<'a, T, F, E>
    where
        T: Sync,
        E: Send + Display,
        F: Fn(&T) -> Result<(), E> + Sync,
    {
        self.batch_measure(name, items, op, DEFAULT_BATCH_SIZE)
    }
}

pub(crate) fn error_metadata(err: &impl Display) -> Metadata {
    let mut md = Metadata::new();
    md.insert("error".to_owned(), serde_json::Value::String(err.to_string()));
    md
}

#[cfg(test)]
#[path = "../../tests/unit/perf/tracker.rs"]
mod tests;
