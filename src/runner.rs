use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::CurateError;
use crate::pipeline::{ProgressEvent, ProgressSink};

/// Contiguous `[start, end)` ranges of at most `size` rows covering
/// `[start, total)`.
pub fn batch_ranges(total: usize, start: usize, size: usize) -> Vec<(usize, usize)> {
    let size = size.max(1);
    (start..total)
        .step_by(size)
        .map(|begin| (begin, (begin + size).min(total)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    Failed(i32),
    /// Killed by a signal or exited with 130.
    Interrupted,
}

pub trait WorkerLauncher {
    fn launch(&self, start: usize, end: usize, use_mcp: bool) -> Result<WorkerExit, CurateError>;
}

/// Re-invokes the current executable as `worker <start> <end> <use_mcp>`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    config: Option<String>,
}

impl ProcessLauncher {
    pub fn new(config: Option<String>) -> Result<Self, CurateError> {
        let program =
            std::env::current_exe().map_err(|err| CurateError::WorkerSpawn(err.to_string()))?;
        Ok(Self { program, config })
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, start: usize, end: usize, use_mcp: bool) -> Result<WorkerExit, CurateError> {
        let mut command = Command::new(&self.program);
        if let Some(config) = &self.config {
            command.arg("--config").arg(config);
        }
        command
            .arg("worker")
            .arg(start.to_string())
            .arg(end.to_string())
            .arg(use_mcp.to_string());
        tracing::debug!(?command, "launching worker");

        let status = command
            .status()
            .map_err(|err| CurateError::WorkerSpawn(err.to_string()))?;
        Ok(match status.code() {
            Some(0) => WorkerExit::Success,
            Some(130) | None => WorkerExit::Interrupted,
            Some(code) => WorkerExit::Failed(code),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub total: usize,
    pub start_index: usize,
    pub batches: usize,
    pub elapsed_secs: f64,
}

pub struct Runner<L: WorkerLauncher> {
    launcher: L,
    batch_size: usize,
    cooldown: Duration,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<L: WorkerLauncher> Runner<L> {
    pub fn new(launcher: L, batch_size: usize, cooldown: Duration) -> Self {
        Self {
            launcher,
            batch_size,
            cooldown,
            interrupt: None,
        }
    }

    /// Flag set from a Ctrl-C handler. Checked before each batch and after a
    /// worker exits.
    pub fn with_interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Runs the batches one after another. The first failing batch stops the
    /// run; the error carries the index to resume from.
    pub fn run(
        &self,
        total: usize,
        start_index: usize,
        use_mcp: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, CurateError> {
        let ranges = batch_ranges(total, start_index, self.batch_size);
        let mode = if use_mcp { "custom" } else { "default" };
        tracing::info!(
            mode,
            total,
            start_index,
            batch_size = self.batch_size,
            batches = ranges.len(),
            "starting batch run"
        );

        let started = Instant::now();
        for (index, &(start, end)) in ranges.iter().enumerate() {
            let batch = index + 1;
            if self.interrupted() {
                tracing::warn!(batch, resume_from = start, "run interrupted");
                return Err(CurateError::Interrupted {
                    batch,
                    resume_from: start,
                });
            }
            let batch_started = Instant::now();
            sink.event(ProgressEvent {
                message: format!("phase=Batch; {batch}/{} rows [{start}, {end})", ranges.len()),
                elapsed: None,
            });

            let exit = match self.launcher.launch(start, end, use_mcp)? {
                WorkerExit::Failed(_) if self.interrupted() => WorkerExit::Interrupted,
                exit => exit,
            };
            match exit {
                WorkerExit::Success => {}
                WorkerExit::Failed(code) => {
                    tracing::error!(batch, code, resume_from = start, "worker failed");
                    return Err(CurateError::WorkerFailed {
                        batch,
                        code,
                        resume_from: start,
                    });
                }
                WorkerExit::Interrupted => {
                    tracing::warn!(batch, resume_from = start, "worker interrupted");
                    return Err(CurateError::Interrupted {
                        batch,
                        resume_from: start,
                    });
                }
            }
            sink.event(ProgressEvent {
                message: format!("phase=Batch; {batch}/{} done", ranges.len()),
                elapsed: Some(batch_started.elapsed()),
            });

            if batch < ranges.len() && !self.cooldown.is_zero() && !self.interrupted() {
                thread::sleep(self.cooldown);
            }
        }

        let report = RunReport {
            total,
            start_index,
            batches: ranges.len(),
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(batches = report.batches, elapsed_secs = report.elapsed_secs, "batch run finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_the_tail() {
        assert_eq!(batch_ranges(65, 0, 30), vec![(0, 30), (30, 60), (60, 65)]);
        assert_eq!(batch_ranges(65, 40, 30), vec![(40, 65)]);
        assert!(batch_ranges(10, 10, 30).is_empty());
    }
}
