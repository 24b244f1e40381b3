// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! A unit-test harness that runs every test case in its own forked process.
//!
//! A harness binary registers its test cases and hands control to [`harness_main`]. Each case
//! then runs in a child process that is traced with `ptrace(2)`, so a crash in one case is
//! contained, reported with the module, symbol and offset it happened at, and tallied as
//! aborted while the remaining cases carry on.
//!
//! The flow of a run is:
//!
//! 1. [`registry`]: test cases are registered up front, in order.
//! 2. [`runner`]: each case is forked off, and its check results are sent back through a pipe.
//! 3. [`interceptor`]: the parent observes the child until it exits or is killed by a signal.
//! 4. [`symbolize`]: the faulting address of a killed child is resolved to a symbol.
//! 5. [`reporter`]: a status line per case and a boxed summary are printed.
//!
//! Test bodies use the checks in [`checks`].

#[cfg(not(target_os = "linux"))]
compile_error!("extest-runner traces test processes with ptrace and only supports Linux");

pub mod checks;
mod dispatch;
pub mod errors;
mod helpers;
pub mod interceptor;
pub mod output;
pub mod registry;
pub mod reporter;
pub mod runner;
pub mod symbolize;
pub mod write_str;

pub use dispatch::*;
pub use registry::Registry;
