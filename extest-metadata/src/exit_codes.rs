// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for an extest harness process.
///
/// A harness run may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum ExtestExitCode {}

impl ExtestExitCode {
    /// Every registered test case passed (or none were registered).
    pub const OK: i32 = 0;

    /// One or more test cases failed or aborted.
    pub const TEST_RUN_FAILED: i32 = 1;

    /// Writing the report to stdout produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}

/// Exit codes produced by the child process that runs a single test case.
///
/// The parent reads these back from the wait status to classify a case that terminated
/// normally. Terminations by signal are classified separately.
pub enum CaseExitCode {}

impl CaseExitCode {
    /// Every check recorded by the test case succeeded.
    pub const PASSED: i32 = 0;

    /// At least one non-fatal expectation failed, and no assertion failed.
    pub const EXPECTATION_FAILED: i32 = 1;

    /// An assertion failed and the test body was stopped at that point.
    pub const ASSERTION_FAILED: i32 = 2;

    /// Returns the exit code for a test case given its recorded failures.
    pub fn from_failures(failed: usize, had_assertion: bool) -> i32 {
        match (failed, had_assertion) {
            (0, _) => Self::PASSED,
            (_, true) => Self::ASSERTION_FAILED,
            (_, false) => Self::EXPECTATION_FAILED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, false => CaseExitCode::PASSED; "nothing failed")]
    #[test_case(3, false => CaseExitCode::EXPECTATION_FAILED; "only expectations failed")]
    #[test_case(1, true => CaseExitCode::ASSERTION_FAILED; "assertion failed")]
    #[test_case(0, true => CaseExitCode::PASSED; "assertion flag without a recorded failure")]
    fn case_exit_code_from_failures(failed: usize, had_assertion: bool) -> i32 {
        CaseExitCode::from_failures(failed, had_assertion)
    }
}
