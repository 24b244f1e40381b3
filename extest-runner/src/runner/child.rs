// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code that runs in a freshly forked test child.
//!
//! Nothing here returns: the child always leaves through `_exit` or `abort`, so destructors and
//! buffered output inherited from the parent never run twice.

use crate::{
    checks::{AssertionFailed, with_buffer},
    registry::TestCase,
};
use nix::sys::ptrace;
use std::{
    fs::File,
    io::{self, Write},
    os::fd::OwnedFd,
    panic::{self, AssertUnwindSafe},
};
use tracing::warn;

/// Options for the child side of a test case.
#[derive(Clone, Copy, Debug)]
pub(super) struct ChildOptions {
    pub(super) trace: bool,
    pub(super) colorize_checks: bool,
}

/// Runs `case` in this process and sends its captured output through `write_end`.
pub(super) fn run_case(case: &TestCase, write_end: OwnedFd, opts: ChildOptions) -> ! {
    if opts.trace
        && let Err(err) = ptrace::traceme()
    {
        warn!("{case}: failed to request tracing, faults will not be located: {err}");
    }

    let sink = File::from(write_end);
    with_buffer(|buffer| {
        buffer.reset(opts.colorize_checks);
        buffer.stream_to(sink);
    });
    install_panic_hook();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| case.run()));
    let exit_code = match outcome {
        Ok(()) => with_buffer(|buffer| buffer.exit_code()),
        Err(payload) if payload.is::<AssertionFailed>() => {
            with_buffer(|buffer| buffer.exit_code())
        }
        Err(_) => {
            // The panic hook already recorded the message.
            finish_output();
            flush_stdout();
            std::process::abort();
        }
    };

    finish_output();
    flush_stdout();
    // SAFETY: `_exit` ends the process without running destructors or atexit handlers, which
    // belong to the harness this child was forked from.
    unsafe { libc::_exit(exit_code) }
}

fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        if info.payload().is::<AssertionFailed>() {
            return;
        }
        let message = info.payload_as_str().unwrap_or("Box<dyn Any>");
        with_buffer(|buffer| buffer.record_panic(info.location(), message));
    }));
}

/// Terminates the streamed output with a NUL and closes the pipe.
fn finish_output() {
    if let Err(err) = with_buffer(|buffer| buffer.finish_stream()) {
        warn!("failed to send captured output to the harness: {err}");
    }
}

fn flush_stdout() {
    if let Err(err) = io::stdout().flush() {
        warn!("failed to flush test output: {err}");
    }
}
