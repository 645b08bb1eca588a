use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;

use litcurate::error::CurateError;
use litcurate::output::JsonOutput;
use litcurate::runner::{Runner, WorkerExit, WorkerLauncher};

/// Replays scripted exits and records every launch.
struct ScriptedLauncher {
    exits: RefCell<Vec<WorkerExit>>,
    calls: RefCell<Vec<(usize, usize, bool)>>,
}

impl ScriptedLauncher {
    fn new(exits: Vec<WorkerExit>) -> Self {
        Self {
            exits: RefCell::new(exits),
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl WorkerLauncher for ScriptedLauncher {
    fn launch(&self, start: usize, end: usize, use_mcp: bool) -> Result<WorkerExit, CurateError> {
        self.calls.borrow_mut().push((start, end, use_mcp));
        let mut exits = self.exits.borrow_mut();
        if exits.is_empty() {
            Ok(WorkerExit::Success)
        } else {
            Ok(exits.remove(0))
        }
    }
}

#[test]
fn every_batch_runs_in_order() {
    let runner = Runner::new(ScriptedLauncher::new(Vec::new()), 30, Duration::ZERO);
    let report = runner.run(65, 0, true, &JsonOutput).unwrap();

    assert_eq!(report.batches, 3);
    assert_eq!(report.total, 65);
    assert_eq!(
        *runner_calls(&runner),
        vec![(0, 30, true), (30, 60, true), (60, 65, true)]
    );
}

#[test]
fn failed_batch_stops_with_resume_index() {
    let runner = Runner::new(
        ScriptedLauncher::new(vec![WorkerExit::Success, WorkerExit::Failed(1)]),
        30,
        Duration::ZERO,
    );
    let err = runner.run(65, 0, false, &JsonOutput).unwrap_err();

    assert_matches!(
        err,
        CurateError::WorkerFailed {
            batch: 2,
            code: 1,
            resume_from: 30
        }
    );
    assert_eq!(runner_calls(&runner).len(), 2);
}

#[test]
fn interrupted_worker_stops_the_run() {
    let runner = Runner::new(
        ScriptedLauncher::new(vec![WorkerExit::Interrupted]),
        30,
        Duration::ZERO,
    );
    assert_matches!(
        runner.run(65, 0, false, &JsonOutput),
        Err(CurateError::Interrupted {
            batch: 1,
            resume_from: 0
        })
    );
}

#[test]
fn resume_starts_from_given_index() {
    let runner = Runner::new(ScriptedLauncher::new(Vec::new()), 30, Duration::ZERO);
    let report = runner.run(65, 40, false, &JsonOutput).unwrap();

    assert_eq!(report.batches, 1);
    assert_eq!(report.start_index, 40);
    assert_eq!(*runner_calls(&runner), vec![(40, 65, false)]);
}

#[test]
fn nothing_left_is_an_empty_run() {
    let runner = Runner::new(ScriptedLauncher::new(Vec::new()), 30, Duration::ZERO);
    let report = runner.run(10, 10, false, &JsonOutput).unwrap();
    assert_eq!(report.batches, 0);
    assert!(runner_calls(&runner).is_empty());
}

/// Sets the interrupt flag while the given batch runs, as a Ctrl-C would.
struct SignallingLauncher {
    flag: Arc<AtomicBool>,
    on_call: usize,
    exit: WorkerExit,
    calls: RefCell<Vec<(usize, usize)>>,
}

impl WorkerLauncher for SignallingLauncher {
    fn launch(&self, start: usize, end: usize, _use_mcp: bool) -> Result<WorkerExit, CurateError> {
        let mut calls = self.calls.borrow_mut();
        calls.push((start, end));
        if calls.len() == self.on_call {
            self.flag.store(true, Ordering::SeqCst);
            return Ok(self.exit);
        }
        Ok(WorkerExit::Success)
    }
}

fn signalling_runner(on_call: usize, exit: WorkerExit) -> Runner<SignallingLauncher> {
    let flag = Arc::new(AtomicBool::new(false));
    let launcher = SignallingLauncher {
        flag: Arc::clone(&flag),
        on_call,
        exit,
        calls: RefCell::new(Vec::new()),
    };
    Runner::new(launcher, 30, Duration::ZERO).with_interrupt_flag(flag)
}

#[test]
fn ctrl_c_after_a_finished_batch_resumes_at_the_next() {
    let runner = signalling_runner(1, WorkerExit::Success);
    assert_matches!(
        runner.run(65, 0, false, &JsonOutput),
        Err(CurateError::Interrupted {
            batch: 2,
            resume_from: 30
        })
    );
    assert_eq!(*runner.launcher().calls.borrow(), vec![(0, 30)]);
}

#[test]
fn ctrl_c_turns_a_failed_worker_into_an_interruption() {
    let runner = signalling_runner(2, WorkerExit::Failed(1));
    assert_matches!(
        runner.run(65, 0, false, &JsonOutput),
        Err(CurateError::Interrupted {
            batch: 2,
            resume_from: 30
        })
    );
    assert_eq!(runner.launcher().calls.borrow().len(), 2);
}

#[test]
fn flag_set_before_the_run_launches_nothing() {
    let flag = Arc::new(AtomicBool::new(true));
    let runner = Runner::new(ScriptedLauncher::new(Vec::new()), 30, Duration::ZERO)
        .with_interrupt_flag(flag);
    assert_matches!(
        runner.run(65, 40, false, &JsonOutput),
        Err(CurateError::Interrupted {
            batch: 1,
            resume_from: 40
        })
    );
    assert!(runner_calls(&runner).is_empty());
}

fn runner_calls(runner: &Runner<ScriptedLauncher>) -> std::cell::Ref<'_, Vec<(usize, usize, bool)>> {
    runner.launcher().calls.borrow()
}
