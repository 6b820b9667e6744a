use std::fmt::Display;
use std::iter::FusedIterator;
use std::marker::PhantomData;

use rayon::prelude::*;

use crate::perf::tracker::{Metadata, PerformanceTracker, error_metadata};

pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Timing of one completed batch.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    /// 1-based.
    pub batch_number: usize,
    pub item_count: usize,
    pub duration: Option<f64>,
}

/// Lazy batch runner returned by [`PerformanceTracker::batch_measure`].
pub struct BatchMeasure<'a, T, F, E> {
    tracker: &'a PerformanceTracker,
    name: String,
    items: &'a [T],
    op: F,
    batch_size: usize,
    cursor: usize,
    batch_number: usize,
    finished: bool,
    _err: PhantomData<fn() -> E>,
}

impl<'a, T, F, E> BatchMeasure<'a, T, F, E> {
    pub(crate) fn new(
        tracker: &'a PerformanceTracker,
        name: &str,
        items: &'a [T],
        op: F,
        batch_size: usize,
    ) -> Self {
        let batch_size = batch_size.max(1);
        tracing::debug!(
            operation = name,
            total_items = items.len(),
            batch_size,
            total_batches = items.len().div_ceil(batch_size),
            "starting batch operation"
        );
        Self {
            tracker,
            name: name.to_owned(),
            items,
            op,
            batch_size,
            cursor: 0,
            batch_number: 0,
            finished: false,
            _err: PhantomData,
        }
    }

    fn remaining_batches(&self) -> usize {
        if self.finished {
            0
        } else {
            (self.items.len() - self.cursor).div_ceil(self.batch_size)
        }
    }
}

impl<T, E, F> Iterator for BatchMeasure<'_, T, F, E>
where
    T: Sync,
    E: Send + Display,
    F: Fn(&T) -> Result<(), E> + Sync,
{
    type Item = Result<BatchProgress, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cursor >= self.items.len() {
            self.finished = true;
            tracing::debug!(
                operation = %self.name,
                batches = self.batch_number,
                "batch operation complete"
            );
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.items.len());
        let batch = &self.items[self.cursor..end];
        self.cursor = end;
        self.batch_number += 1;

        let metric = format!("{}-batch-{}", self.name, self.batch_number);
        let mut md = Metadata::new();
        md.insert("batchNumber".to_owned(), self.batch_number.into());
        md.insert("itemCount".to_owned(), batch.len().into());
        self.tracker.start(&metric, Some(md));

        let op = &self.op;
        match batch.par_iter().try_for_each(op) {
            Ok(()) => Some(Ok(BatchProgress {
                batch_number: self.batch_number,
                item_count: batch.len(),
                duration: self.tracker.end(&metric, None),
            })),
            Err(err) => {
                self.tracker.end(&metric, Some(error_metadata(&err)));
                self.finished = true;
                tracing::warn!(operation = %self.name, batch = self.batch_number, error = %err, "batch failed");
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // A failure may end the sequence early.
        (0, Some(self.remaining_batches()))
    }
}

impl<T, E, F> FusedIterator for BatchMeasure<'_, T, F, E>
where
    T: Sync,
    E: Send + Display,
    F: Fn(&T) -> Result<(), E> + Sync,
{
}

#[cfg(test)]
#[path = "../../tests/unit/perf/batch.rs"]
mod tests;
