// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::events::TestEvent;
use crate::{
    helpers::{BoxCharacters, DisplaySignal, plural},
    registry::TestCase,
    runner::{ExecutionResult, ExecutionStatus, ResultKind, RunStats},
    write_str::WriteStr,
};
use debug_ignore::DebugIgnore;
use extest_metadata::CaseExitCode;
use owo_colors::{OwoColorize, Style};
use std::{fmt, io, time::Duration};

/// The inner width of the summary box.
const SUMMARY_WIDTH: usize = 20;

/// Test reporter builder.
#[derive(Debug, Default)]
pub struct TestReporterBuilder {
    verbose: bool,
}

impl TestReporterBuilder {
    /// Sets whether durations are shown for each test case and the whole run.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new test reporter writing to `output`.
    pub fn build<'a>(&self, output: impl WriteStr + 'a) -> TestReporter<'a> {
        TestReporter {
            writer: DebugIgnore(Box::new(output)),
            styles: Box::default(),
            box_chars: BoxCharacters::default(),
            verbose: self.verbose,
        }
    }
}

/// Functionality to report test results to a writer.
#[derive(Debug)]
pub struct TestReporter<'a> {
    writer: DebugIgnore<Box<dyn WriteStr + 'a>>,
    styles: Box<Styles>,
    box_chars: BoxCharacters,
    verbose: bool,
}

impl TestReporter<'_> {
    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Draws the summary box with Unicode box-drawing characters.
    pub fn use_unicode(&mut self) {
        self.box_chars.use_unicode();
    }

    /// Reports a test event, flushing the writer afterwards.
    ///
    /// Flushing after every event keeps buffered report text out of forked children.
    pub fn report_event(&mut self, event: TestEvent<'_>) -> io::Result<()> {
        self.write_event(&event)?;
        self.writer.write_str_flush()
    }

    fn write_event(&mut self, event: &TestEvent<'_>) -> io::Result<()> {
        match event {
            TestEvent::RunStarted { run_count } => {
                if self.verbose {
                    writeln!(
                        self.writer,
                        "{:>12} {} {}",
                        "Starting".style(self.styles.pass),
                        run_count.style(self.styles.count),
                        plural::test_cases_str(*run_count),
                    )?;
                }
            }
            TestEvent::TestFinished { case, result, .. } => {
                self.write_finished(case, result)?;
            }
            TestEvent::RunFinished { elapsed, run_stats } => {
                self.write_summary(run_stats)?;
                if self.verbose {
                    self.write_run_duration(*elapsed, run_stats)?;
                }
            }
        }
        Ok(())
    }

    fn write_finished(&mut self, case: &TestCase, result: &ExecutionResult) -> io::Result<()> {
        let styles = &*self.styles;
        let writer = &mut **self.writer;

        writeln!(writer)?;
        if self.verbose {
            write!(writer, "[{:>8.3}s] ", result.time_taken.as_secs_f64())?;
        }
        write!(
            writer,
            "Test case {}::{} is ",
            case.suite().style(styles.suite),
            case.name().style(styles.case),
        )?;

        let reason = DisplayReason {
            status: &result.status,
            styles,
        };
        match result.result_kind() {
            ResultKind::Passed => {
                writeln!(writer, "{}.", "passed".style(styles.pass))?;
                return Ok(());
            }
            ResultKind::Failed => {
                writeln!(writer, "{} due to {reason}", "failed".style(styles.fail))?;
            }
            ResultKind::Aborted => {
                writeln!(writer, "{} due to {reason}", "aborted".style(styles.abort))?;
            }
        }

        match &result.status {
            ExecutionStatus::Signaled { diagnostic, .. } => writer.write_str(diagnostic)?,
            ExecutionStatus::ExecFail { message } => writeln!(writer, "\t{message}")?,
            ExecutionStatus::Exited { .. } => {}
        }

        let output = &result.captured_output;
        if !output.is_empty() {
            writer.write_str(output)?;
            if !output.ends_with('\n') {
                writeln!(writer)?;
            }
        }
        Ok(())
    }

    fn write_summary(&mut self, run_stats: &RunStats) -> io::Result<()> {
        let styles = &*self.styles;
        let chars = &self.box_chars;
        let writer = &mut **self.writer;

        // The title takes up 14 columns, leaving 3 on either side.
        writeln!(writer)?;
        writeln!(
            writer,
            " {}{} Test summary {}{}",
            chars.top_left(),
            chars.top(3),
            chars.top(3),
            chars.top_right(),
        )?;

        let rows = [
            ("Passed", run_stats.passed, styles.pass_count),
            ("Failed", run_stats.failed, styles.fail_count),
            ("Aborted", run_stats.aborted, styles.abort_count),
        ];
        for (label, count, style) in rows {
            if count > 0 {
                writeln!(
                    writer,
                    " {} {label:<13} {:>4} {}",
                    chars.left(),
                    count.style(style),
                    chars.right(),
                )?;
            }
        }

        writeln!(
            writer,
            " {}{}{}",
            chars.bottom_left(),
            chars.bottom(SUMMARY_WIDTH),
            chars.bottom_right(),
        )
    }

    fn write_run_duration(&mut self, elapsed: Duration, run_stats: &RunStats) -> io::Result<()> {
        let summary_style = if run_stats.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        writeln!(
            self.writer,
            "{:>12} [{:>8.3}s] {} {} run",
            "Finished".style(summary_style),
            elapsed.as_secs_f64(),
            run_stats.finished_count.style(self.styles.count),
            plural::test_cases_str(run_stats.finished_count),
        )
    }
}

/// Describes why a test case did not pass.
struct DisplayReason<'a> {
    status: &'a ExecutionStatus,
    styles: &'a Styles,
}

impl fmt::Display for DisplayReason<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.status {
            ExecutionStatus::Exited {
                code: CaseExitCode::PASSED,
            } => write!(f, "passed."),
            ExecutionStatus::Exited {
                code: CaseExitCode::EXPECTATION_FAILED,
            } => write!(f, "a failed expect."),
            ExecutionStatus::Exited {
                code: CaseExitCode::ASSERTION_FAILED,
            } => write!(f, "a failed assertion."),
            ExecutionStatus::Exited { code } => write!(f, "an unexpected exit code {code}."),
            ExecutionStatus::Signaled { signal, .. } => {
                write!(f, "a programming error: ")?;
                match signal_description(signal) {
                    Some(description) => {
                        write!(f, "{}.", description.style(self.styles.reason))
                    }
                    None => write!(
                        f,
                        "{}, signal {}.",
                        "unknown error".style(self.styles.reason),
                        DisplaySignal(signal),
                    ),
                }
            }
            ExecutionStatus::ExecFail { .. } => write!(f, "a failure to start the test process."),
        }
    }
}

fn signal_description(signal: i32) -> Option<&'static str> {
    match signal {
        libc::SIGFPE => Some("division by zero"),
        libc::SIGSEGV => Some("segmentation fault"),
        libc::SIGBUS => Some("bus error"),
        libc::SIGILL => Some("illegal instruction"),
        libc::SIGABRT => Some("abort"),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Styles {
    pass: Style,
    fail: Style,
    abort: Style,
    reason: Style,
    suite: Style,
    case: Style,
    count: Style,
    pass_count: Style,
    fail_count: Style,
    abort_count: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.pass = Style::new().green();
        self.fail = Style::new().red();
        self.abort = Style::new().magenta();
        self.reason = Style::new().blue().bold();
        self.suite = Style::new().magenta().bold();
        self.case = Style::new().blue().bold();
        self.count = Style::new().bold();
        self.pass_count = Style::new().green().bold();
        self.fail_count = Style::new().red().bold();
        self.abort_count = Style::new().blue().bold();
    }
}
