// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::report::Report;
use camino::Utf8PathBuf;
use color_eyre::Result;
use std::{
    borrow::Cow,
    collections::HashMap,
    ffi::OsString,
    fmt,
    process::{Command, ExitStatus},
};

/// A harness binary invocation.
#[derive(Clone, Debug)]
pub struct HarnessCli {
    bin: Utf8PathBuf,
    args: Vec<String>,
    envs: HashMap<OsString, OsString>,
    unchecked: bool,
}

impl HarnessCli {
    /// Creates an invocation of the harness at `bin`, with colors turned off.
    pub fn new(bin: impl Into<Utf8PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            args: vec!["--color".to_owned(), "never".to_owned()],
            envs: HashMap::new(),
            unchecked: false,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(&mut self, arg: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(arg.into_iter().map(Into::into));
        self
    }

    pub fn env(&mut self, k: impl Into<OsString>, v: impl Into<OsString>) -> &mut Self {
        self.envs.insert(k.into(), v.into());
        self
    }

    /// If set, a non-zero exit code doesn't cause a panic.
    pub fn unchecked(&mut self, unchecked: bool) -> &mut Self {
        self.unchecked = unchecked;
        self
    }

    pub fn output(&self) -> HarnessOutput {
        let mut command = Command::new(&self.bin);
        command.args(&self.args);
        // Keep the caller's settings from leaking into the harness.
        for var in ["EXTEST_COLOR", "EXTEST_VERBOSE", "EXTEST_NO_TRACE", "EXTEST_LOG"] {
            command.env_remove(var);
        }
        command.envs(&self.envs);
        let output = command.output().expect("failed to execute");

        let ret = HarnessOutput {
            command,
            exit_status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        };

        if !self.unchecked && !output.status.success() {
            panic!("command failed:\n\n{ret}");
        }

        ret
    }
}

pub struct HarnessOutput {
    pub command: Command,
    pub exit_status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl HarnessOutput {
    pub fn stdout_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Parses stdout as a harness report.
    pub fn report(&self) -> Result<Report> {
        Report::parse(&self.stdout_as_str())
    }
}

impl fmt::Display for HarnessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command: {:?}\nexit code: {:?}\n\
                   --- stdout ---\n{}\n\n--- stderr ---\n{}\n\n",
            self.command,
            self.exit_status.code(),
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr)
        )
    }
}

// Make Debug output the same as Display output, so `.unwrap()` and `.expect()` are nicer.
impl fmt::Debug for HarnessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
