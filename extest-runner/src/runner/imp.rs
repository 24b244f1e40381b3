// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::child::{self, ChildOptions};
use crate::{
    errors::{DisplayErrorChain, RunCaseError},
    interceptor::{ChildTermination, FaultInterceptor, PtraceOps},
    registry::{Registry, TestCase},
    reporter::events::TestEvent,
    symbolize::SymbolResolver,
};
use extest_metadata::CaseExitCode;
use nix::{
    sys::{
        signal::{Signal, kill},
        wait::waitpid,
    },
    unistd::{self, ForkResult, Pid},
};
use std::{
    convert::Infallible,
    fs::File,
    io::{self, Read, Write},
    os::fd::OwnedFd,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug)]
pub struct TestRunnerBuilder {
    trace: bool,
    colorize_checks: bool,
}

impl Default for TestRunnerBuilder {
    fn default() -> Self {
        Self {
            trace: true,
            colorize_checks: false,
        }
    }
}

impl TestRunnerBuilder {
    /// Sets whether children are traced to locate faults. Defaults to true.
    pub fn set_trace(&mut self, trace: bool) -> &mut Self {
        self.trace = trace;
        self
    }

    /// Sets whether check lines captured from children are colorized. Defaults to false.
    pub fn set_colorize_checks(&mut self, colorize_checks: bool) -> &mut Self {
        self.colorize_checks = colorize_checks;
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(&self, registry: &'a Registry, resolver: SymbolResolver) -> TestRunner<'a> {
        TestRunner {
            registry,
            resolver,
            child_opts: ChildOptions {
                trace: self.trace,
                colorize_checks: self.colorize_checks,
            },
        }
    }
}

/// Context for running test cases.
#[derive(Debug)]
pub struct TestRunner<'a> {
    registry: &'a Registry,
    resolver: SymbolResolver,
    child_opts: ChildOptions,
}

impl<'a> TestRunner<'a> {
    /// Executes every registered test case, one at a time and each in its own process.
    ///
    /// The callback is called with the results of each test case.
    pub fn execute<F>(&self, mut callback: F) -> RunStats
    where
        F: FnMut(TestEvent<'a>),
    {
        let res = self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        });
        match res {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Executes every registered test case, one at a time and each in its own process.
    ///
    /// Accepts a callback that is called with the results of each test case. If the callback
    /// returns an error, no further test cases are run and the error is returned.
    pub fn try_execute<E, F>(&self, mut callback: F) -> Result<RunStats, E>
    where
        F: FnMut(TestEvent<'a>) -> Result<(), E>,
    {
        let start_time = Instant::now();
        let mut run_stats = RunStats {
            initial_run_count: self.registry.len(),
            ..RunStats::default()
        };

        callback(TestEvent::RunStarted {
            run_count: run_stats.initial_run_count,
        })?;

        for case in self.registry.all() {
            let result = self.run_case(case);
            run_stats.on_case_finished(&result);

            callback(TestEvent::TestFinished {
                case,
                result,
                run_stats,
            })?;
        }

        callback(TestEvent::RunFinished {
            elapsed: start_time.elapsed(),
            run_stats,
        })?;

        Ok(run_stats)
    }

    // ---
    // Helper methods
    // ---

    /// Runs an individual test case in its own process.
    fn run_case(&self, case: &TestCase) -> ExecutionResult {
        let start_time = Instant::now();

        match self.run_case_inner(case) {
            Ok((termination, captured_output)) => ExecutionResult {
                status: termination.into(),
                captured_output,
                time_taken: start_time.elapsed(),
            },
            Err(err) => {
                let message = DisplayErrorChain::new(&err).to_string();
                warn!("{case}: {message}");
                ExecutionResult {
                    status: ExecutionStatus::ExecFail { message },
                    captured_output: String::new(),
                    time_taken: start_time.elapsed(),
                }
            }
        }
    }

    fn run_case_inner(&self, case: &TestCase) -> Result<(ChildTermination, String), RunCaseError> {
        let (read_end, write_end) =
            unistd::pipe().map_err(|err| RunCaseError::ChannelCreate { err })?;

        // Anything still buffered here would be flushed a second time by the child.
        if let Err(err) = io::stdout().flush() {
            debug!("failed to flush stdout before forking: {err}");
        }

        // SAFETY: the harness runs cases from a single thread, and the child only runs the test
        // body before leaving through `_exit` or `abort`.
        let fork_result = unsafe { unistd::fork() }.map_err(|err| RunCaseError::Fork { err })?;
        let pid = match fork_result {
            ForkResult::Child => {
                drop(read_end);
                child::run_case(case, write_end, self.child_opts)
            }
            ForkResult::Parent { child } => child,
        };
        drop(write_end);
        debug!("{case}: running in process {pid}");

        // Drain the pipe while waiting, so a child can't block on a full pipe buffer.
        let reader = thread::spawn(move || read_output(read_end));

        let mut interceptor = FaultInterceptor::new(PtraceOps, &self.resolver, pid);
        let termination = match interceptor.run_to_completion() {
            Ok(termination) => termination,
            Err(err) => {
                reap(pid);
                let _ = reader.join();
                return Err(err.into());
            }
        };

        let captured_output = reader
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("output reader thread panicked")))
            .map_err(|err| RunCaseError::ReadOutput { err })?;

        Ok((termination, captured_output))
    }
}

/// Kills and reaps a child that can no longer be observed.
fn reap(pid: Pid) {
    if let Err(err) = kill(pid, Signal::SIGKILL) {
        debug!("failed to kill process {pid}: {err}");
    }
    if let Err(err) = waitpid(pid, None) {
        debug!("failed to reap process {pid}: {err}");
    }
}

fn read_output(read_end: OwnedFd) -> io::Result<String> {
    let mut bytes = Vec::new();
    File::from(read_end).read_to_end(&mut bytes)?;
    Ok(decode_output(&bytes))
}

/// Decodes the bytes sent by a child, up to the first NUL. A child killed by a signal never
/// sends the NUL, so everything it streamed is kept.
pub(crate) fn decode_output(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Information about a test case that finished running.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionResult {
    /// How the child process ended.
    pub status: ExecutionStatus,

    /// The text the child sent back, up to its NUL terminator.
    pub captured_output: String,

    /// The time it took to run the case, including process setup.
    pub time_taken: Duration,
}

impl ExecutionResult {
    /// Returns how this result is tallied.
    pub fn result_kind(&self) -> ResultKind {
        self.status.result_kind()
    }
}

/// How a test child ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExecutionStatus {
    /// The child exited with a status code.
    Exited {
        /// The exit code, following the [`CaseExitCode`] contract.
        code: i32,
    },

    /// The child was terminated by a signal.
    Signaled {
        /// The signal number.
        signal: i32,
        /// A description of the faulting location.
        diagnostic: String,
    },

    /// The child could not be started or observed.
    ExecFail {
        /// A description of the error.
        message: String,
    },
}

impl ExecutionStatus {
    /// Returns how this status is tallied.
    ///
    /// A signal always means aborted, even if the child had already recorded failures.
    pub fn result_kind(&self) -> ResultKind {
        match self {
            Self::Exited {
                code: CaseExitCode::PASSED,
            } => ResultKind::Passed,
            Self::Exited { .. } => ResultKind::Failed,
            Self::Signaled { .. } | Self::ExecFail { .. } => ResultKind::Aborted,
        }
    }
}

impl From<ChildTermination> for ExecutionStatus {
    fn from(termination: ChildTermination) -> Self {
        match termination {
            ChildTermination::Exited { code } => Self::Exited { code },
            ChildTermination::Signaled { signal, diagnostic } => {
                Self::Signaled { signal, diagnostic }
            }
        }
    }
}

/// The tally a test case contributes to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultKind {
    /// The case exited with [`CaseExitCode::PASSED`].
    Passed,
    /// The case exited with any other code.
    Failed,
    /// The case was terminated by a signal, or could not be run at all.
    Aborted,
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of test cases registered when the run started.
    pub initial_run_count: usize,

    /// The number of test cases that have finished.
    pub finished_count: usize,

    /// The number of test cases that passed.
    pub passed: usize,

    /// The number of test cases that failed an expectation or assertion.
    pub failed: usize,

    /// The number of test cases that were terminated by a signal or couldn't be run.
    pub aborted: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is a failure if any test case failed or aborted, or if the run stopped early.
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.finished_count {
            return false;
        }
        self.failed == 0 && self.aborted == 0
    }

    /// Adds a finished test case to the tallies.
    pub fn on_case_finished(&mut self, result: &ExecutionResult) {
        self.finished_count += 1;
        match result.result_kind() {
            ResultKind::Passed => self.passed += 1,
            ResultKind::Failed => self.failed += 1,
            ResultKind::Aborted => self.aborted += 1,
        }
    }
}
