// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by extest.

use crate::output::NO_HEADING_TARGET;
use extest_metadata::ExtestExitCode;
use std::{error::Error, fmt, io};
use thiserror::Error;

/// An error that prevented a single test case from being run or observed.
///
/// These errors never stop the overall run: the affected case is reported and tallied as
/// aborted, and the runner moves on to the next one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunCaseError {
    /// Creating the output pipe failed.
    #[error("failed to create output channel")]
    ChannelCreate {
        /// The underlying error.
        #[source]
        err: nix::Error,
    },

    /// Forking the child process failed.
    #[error("failed to fork test process")]
    Fork {
        /// The underlying error.
        #[source]
        err: nix::Error,
    },

    /// Observing the child process failed.
    #[error("failed to observe test process")]
    Intercept {
        /// The underlying error.
        #[from]
        err: InterceptError,
    },

    /// Reading the child's captured output failed.
    #[error("failed to read captured output")]
    ReadOutput {
        /// The underlying error.
        #[source]
        err: io::Error,
    },
}

/// An error that occurred while tracing a child process.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterceptError {
    /// Waiting for a state change of the child failed.
    #[error("waiting for process {pid} failed")]
    Wait {
        /// The process ID of the child.
        pid: i32,
        /// The underlying error.
        #[source]
        err: nix::Error,
    },

    /// Resuming the child after a signal stop failed.
    #[error("resuming process {pid} failed")]
    Resume {
        /// The process ID of the child.
        pid: i32,
        /// The underlying error.
        #[source]
        err: nix::Error,
    },
}

/// An error that ends a harness invocation.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("error writing report")]
    WriteOutput {
        #[source]
        err: io::Error,
    },
}

impl ExpectedError {
    pub(crate) fn write_output(err: io::Error) -> Self {
        Self::WriteOutput { err }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::WriteOutput { .. } => ExtestExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr, including its chain of causes.
    pub fn display_to_stderr(&self) {
        let mut next_error = match self {
            Self::WriteOutput { err } => {
                tracing::error!("failed to write test report to stdout");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

/// Displays an error followed by its chain of sources on a single line.
pub struct DisplayErrorChain<E>(E);

impl<E: Error> DisplayErrorChain<E> {
    /// Wraps `error` for display.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut next = self.0.source();
        while let Some(err) = next {
            write!(f, ": {err}")?;
            next = err.source();
        }
        Ok(())
    }
}
