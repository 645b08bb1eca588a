use std::fmt::Display;
use std::thread;
use std::time::Duration;

use camino::Utf8Path;

use crate::error::CurateError;
use crate::fs_util;

/// Chunked fetching with whole-chunk retries.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    chunk_size: usize,
    max_retries: u32,
    retry_delay: Duration,
    pace: Duration,
}

#[derive(Debug)]
pub struct BatchOutcome<T, I> {
    pub results: Vec<T>,
    /// Chunks still failing after every retry round, in input order.
    pub failed: Vec<Vec<I>>,
    pub calls: usize,
}

impl<T, I> BatchOutcome<T, I> {
    pub fn failed_items(&self) -> usize {
        self.failed.iter().map(Vec::len).sum()
    }
}

impl BatchDriver {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_retries: 3,
            retry_delay: Duration::ZERO,
            pace: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Delay between consecutive chunk calls.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Calls `fetch` once per chunk. A chunk whose call fails contributes no
    /// results and is retried as a unit in later rounds.
    pub fn run<I, T, R, F>(&self, label: &str, items: &[I], mut fetch: F) -> BatchOutcome<T, I>
    where
        I: Clone,
        R: IntoIterator<Item = T>,
        F: FnMut(&[I]) -> Result<R, CurateError>,
    {
        let mut outcome = BatchOutcome {
            results: Vec::new(),
            failed: Vec::new(),
            calls: 0,
        };
        let chunks: Vec<Vec<I>> = items.chunks(self.chunk_size).map(<[I]>::to_vec).collect();
        tracing::info!(
            label,
            items = items.len(),
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            "starting batch"
        );

        let mut pending = self.pass(label, chunks, &mut fetch, &mut outcome);

        for round in 1..=self.max_retries {
            if pending.is_empty() {
                break;
            }
            tracing::info!(
                label,
                failed = pending.len(),
                attempt = round,
                max_retries = self.max_retries,
                "retrying failed chunks"
            );
            if !self.retry_delay.is_zero() {
                thread::sleep(self.retry_delay);
            }
            pending = self.pass(label, pending, &mut fetch, &mut outcome);
        }

        if !pending.is_empty() {
            tracing::warn!(label, failed = pending.len(), "chunks still failing after retries");
        }
        outcome.failed = pending;
        outcome
    }

    fn pass<I, T, R, F>(
        &self,
        label: &str,
        chunks: Vec<Vec<I>>,
        fetch: &mut F,
        outcome: &mut BatchOutcome<T, I>,
    ) -> Vec<Vec<I>>
    where
        R: IntoIterator<Item = T>,
        F: FnMut(&[I]) -> Result<R, CurateError>,
    {
        let total = chunks.len();
        let mut failed = Vec::new();
        for (index, chunk) in chunks.into_iter().enumerate() {
            if index > 0 && !self.pace.is_zero() {
                thread::sleep(self.pace);
            }
            outcome.calls += 1;
            match fetch(&chunk) {
                Ok(results) => {
                    outcome.results.extend(results);
                    tracing::info!(label, chunk = index + 1, total, items = chunk.len(), "chunk done");
                }
                Err(err) => {
                    tracing::error!(label, chunk = index + 1, total, error = %err, "chunk failed");
                    failed.push(chunk);
                }
            }
        }
        failed
    }
}

/// Renders the failed-chunk report.
pub fn render_failure_report<I: Display>(failed: &[Vec<I>]) -> String {
    let total_items: usize = failed.iter().map(Vec::len).sum();
    let mut report = format!(
        "Total failed chunks: {}\nTotal failed items: {}\n\n",
        failed.len(),
        total_items
    );
    for (index, chunk) in failed.iter().enumerate() {
        let joined = chunk
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        report.push_str(&format!(
            "Failed chunk {} ({} items):\n{}\n\n",
            index + 1,
            chunk.len(),
            joined
        ));
    }
    report
}

pub fn write_failure_report<I: Display>(path: &Utf8Path, failed: &[Vec<I>]) -> Result<(), CurateError> {
    fs_util::write_atomic(path, render_failure_report(failed).as_bytes())?;
    tracing::warn!(path = %path, chunks = failed.len(), "failed chunks saved");
    Ok(())
}
