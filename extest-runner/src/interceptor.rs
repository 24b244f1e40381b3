// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Observes a traced child process until it terminates.
//!
//! The child requests tracing with `PTRACE_TRACEME` right after the fork. From then on every
//! signal delivered to it stops the child first, which lets the parent read the instruction
//! pointer before the signal is re-delivered. If that signal ends up killing the child, the
//! last instruction pointer seen is the faulting address.
//!
//! Tracing is modeled as an explicit state machine over a single child. OS access goes through
//! the [`TraceOps`] trait so the state machine can be driven by scripted wait statuses in tests.

use crate::{errors::InterceptError, symbolize::ResolveFault};
use nix::{
    errno::Errno,
    sys::{
        ptrace,
        signal::Signal,
        wait::{WaitStatus, waitpid},
    },
    unistd::Pid,
};
use tracing::debug;

/// The state of a traced child.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceState {
    /// The child is running, or hasn't been waited on yet.
    Running,

    /// The child is stopped by a signal and its registers are being read.
    Inspecting,

    /// The child was terminated by a signal. Terminal.
    Faulted,

    /// The child exited normally. Terminal.
    Exited,
}

impl TraceState {
    /// Returns true if the child can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Faulted | Self::Exited)
    }
}

/// How a child process terminated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChildTermination {
    /// The child exited with a status code.
    Exited {
        /// The exit code.
        code: i32,
    },

    /// The child was terminated by a signal.
    Signaled {
        /// The signal number.
        signal: i32,
        /// The diagnostic produced for the last known fault address.
        diagnostic: String,
    },
}

/// Process tracing operations used by [`FaultInterceptor`].
pub trait TraceOps {
    /// Waits for a state change of `pid`.
    fn wait(&mut self, pid: Pid) -> nix::Result<WaitStatus>;

    /// Reads the instruction pointer of the stopped process `pid`.
    ///
    /// Returns `None` if registers can't be read on this platform or for this process.
    fn instruction_pointer(&mut self, pid: Pid) -> Option<usize>;

    /// Resumes the stopped process `pid`, delivering `signal` to it.
    fn resume(&mut self, pid: Pid, signal: Option<Signal>) -> nix::Result<()>;

    /// Stops tracing `pid`.
    fn detach(&mut self, pid: Pid) -> nix::Result<()>;
}

/// [`TraceOps`] backed by `waitpid(2)` and `ptrace(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PtraceOps;

impl TraceOps for PtraceOps {
    fn wait(&mut self, pid: Pid) -> nix::Result<WaitStatus> {
        waitpid(pid, None)
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    fn instruction_pointer(&mut self, pid: Pid) -> Option<usize> {
        let regs = ptrace::getregs(pid).ok()?;
        usize::try_from(regs.rip).ok()
    }

    #[cfg(all(target_os = "linux", target_arch = "aarch64", target_env = "gnu"))]
    fn instruction_pointer(&mut self, pid: Pid) -> Option<usize> {
        let regs = ptrace::getregs(pid).ok()?;
        usize::try_from(regs.pc).ok()
    }

    #[cfg(not(any(
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64", target_env = "gnu"),
    )))]
    fn instruction_pointer(&mut self, _pid: Pid) -> Option<usize> {
        None
    }

    fn resume(&mut self, pid: Pid, signal: Option<Signal>) -> nix::Result<()> {
        ptrace::cont(pid, signal)
    }

    fn detach(&mut self, pid: Pid) -> nix::Result<()> {
        ptrace::detach(pid, None)
    }
}

/// Drives a single traced child to termination.
#[derive(Debug)]
pub struct FaultInterceptor<'a, O, R> {
    ops: O,
    resolver: &'a R,
    pid: Pid,
    state: TraceState,
    last_fault_address: Option<usize>,
}

impl<'a, O: TraceOps, R: ResolveFault> FaultInterceptor<'a, O, R> {
    /// Creates an interceptor for the child `pid`.
    pub fn new(ops: O, resolver: &'a R, pid: Pid) -> Self {
        Self {
            ops,
            resolver,
            pid,
            state: TraceState::Running,
            last_fault_address: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> TraceState {
        self.state
    }

    /// Returns the instruction pointer recorded at the most recent signal stop.
    pub fn last_fault_address(&self) -> Option<usize> {
        self.last_fault_address
    }

    /// Waits until the child exits or is terminated by a signal.
    pub fn run_to_completion(&mut self) -> Result<ChildTermination, InterceptError> {
        loop {
            if let Some(termination) = self.step()? {
                return Ok(termination);
            }
        }
    }

    /// Processes a single wait status.
    ///
    /// Returns the termination once the child reaches a terminal state.
    pub fn step(&mut self) -> Result<Option<ChildTermination>, InterceptError> {
        let pid = self.pid;
        let status = loop {
            match self.ops.wait(pid) {
                Err(Errno::EINTR) => continue,
                other => break other,
            }
        }
        .map_err(|err| InterceptError::Wait {
            pid: pid.as_raw(),
            err,
        })?;

        match status {
            WaitStatus::Stopped(_, signal) => {
                self.state = TraceState::Inspecting;
                if let Some(address) = self.ops.instruction_pointer(pid) {
                    self.last_fault_address = Some(address);
                }
                debug!(
                    "process {pid} stopped by {signal} at {:#x?}, resuming",
                    self.last_fault_address,
                );

                self.ops
                    .resume(pid, Some(signal))
                    .map_err(|err| InterceptError::Resume {
                        pid: pid.as_raw(),
                        err,
                    })?;
                self.state = TraceState::Running;
                Ok(None)
            }
            WaitStatus::Signaled(_, signal, _) => {
                let diagnostic = self.resolver.describe_fault(self.last_fault_address);
                // The child is gone by now, so this usually fails with ESRCH.
                if let Err(err) = self.ops.detach(pid) {
                    debug!("detaching from process {pid} failed: {err}");
                }
                self.state = TraceState::Faulted;
                debug!("process {pid} terminated by {signal}");

                Ok(Some(ChildTermination::Signaled {
                    signal: signal as i32,
                    diagnostic,
                }))
            }
            WaitStatus::Exited(_, code) => {
                self.state = TraceState::Exited;
                debug!("process {pid} exited with code {code}");
                Ok(Some(ChildTermination::Exited { code }))
            }
            other => {
                debug!("ignoring wait status {other:?} for process {pid}");
                Ok(None)
            }
        }
    }
}
