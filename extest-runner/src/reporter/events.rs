// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced by the runner and consumed by the reporter.

use crate::{
    registry::TestCase,
    runner::{ExecutionResult, RunStats},
};
use std::time::Duration;

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and consumed by a
/// [`TestReporter`](crate::reporter::TestReporter).
#[derive(Clone, Debug)]
pub enum TestEvent<'a> {
    /// The test run started.
    RunStarted {
        /// The number of test cases that will be run.
        run_count: usize,
    },

    /// A test case finished running.
    TestFinished {
        /// The test case that finished.
        case: &'a TestCase,

        /// How the case ended, and what it sent back.
        result: ExecutionResult,

        /// Current statistics for the run, including this case.
        run_stats: RunStats,
    },

    /// The test run finished.
    RunFinished {
        /// The time taken by the whole run.
        elapsed: Duration,

        /// Final statistics for the run.
        run_stats: RunStats,
    },
}
