// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A small set of checks for writing test bodies.
//!
//! Checks come in two flavors:
//!
//! * **Expectations** ([`expect_that`], [`expect_each`]) record a failure and let the test body
//!   carry on.
//! * **Assertions** ([`assert_that`], [`assert_each`]) record a failure and then stop the test
//!   body by unwinding with the [`AssertionFailed`] sentinel.
//!
//! Every check appends one line to a process-local [`CaseBuffer`]. The runner resets that
//! buffer in each freshly forked child and streams it to the parent, so lines recorded before a
//! crash still reach the report.
//!
//! ```no_run
//! use extest_runner::checks::{assert_that, expect_each, expect_that};
//!
//! fn math_add() {
//!     assert_that(2 + 2).to_equal(4);
//!     expect_that(vec![1, 2, 3]).to_contain(2);
//!     expect_each([2, 3, 4]).to_be_greater_than(1);
//! }
//! ```

use debug_ignore::DebugIgnore;
use extest_metadata::CaseExitCode;
use owo_colors::{OwoColorize, Style};
use std::{
    fmt,
    io::{self, Write},
    panic::Location,
    sync::{Mutex, PoisonError},
};
use swrite::{SWrite, swrite};
use tracing::warn;

/// The panic payload used to stop a test body after a failed assertion.
///
/// The runner's fault boundary catches exactly this payload. Any other panic is treated as a
/// programming fault.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssertionFailed;

/// Whether a check is an expectation or an assertion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckKind {
    /// A failure is recorded and the test continues.
    Expect,
    /// A failure is recorded and the test body stops.
    Assertion,
}

impl CheckKind {
    fn label(self) -> &'static str {
        match self {
            CheckKind::Expect => "Expect",
            CheckKind::Assertion => "Assertion",
        }
    }
}

/// Accumulates check results for the test case running in this process.
#[derive(Debug)]
pub struct CaseBuffer {
    text: String,
    passed: usize,
    failed: usize,
    had_assertion: bool,
    colorize: bool,
    sink: Option<DebugIgnore<Box<dyn Write + Send>>>,
}

impl CaseBuffer {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            text: String::new(),
            passed: 0,
            failed: 0,
            had_assertion: false,
            colorize: false,
            sink: None,
        }
    }

    /// Clears all recorded results. `colorize` controls ANSI styling of subsequent lines.
    pub fn reset(&mut self, colorize: bool) {
        self.text.clear();
        self.passed = 0;
        self.failed = 0;
        self.had_assertion = false;
        self.colorize = colorize;
        self.sink = None;
    }

    /// Forwards each line to `sink` as soon as it is recorded.
    pub fn stream_to(&mut self, sink: impl Write + Send + 'static) {
        self.sink = Some(DebugIgnore(Box::new(sink)));
    }

    /// Writes the NUL terminator to the sink and closes it.
    pub fn finish_stream(&mut self) -> io::Result<()> {
        match self.sink.take() {
            Some(mut sink) => {
                sink.write_all(&[0])?;
                sink.flush()
            }
            None => Ok(()),
        }
    }

    /// Records a successful check.
    pub fn record_pass(&mut self, kind: CheckKind, location: &Location<'_>) {
        self.passed += 1;
        let styles = self.styles();
        let start = self.text.len();
        swrite!(
            self.text,
            "\t{} passed at {}:{} {}.\n",
            kind.label(),
            location.file(),
            location.line(),
            "succeeded".style(styles.pass),
        );
        self.forward(start);
    }

    /// Records a failed check with a description of the mismatch.
    pub fn record_failure(&mut self, kind: CheckKind, location: &Location<'_>, message: &str) {
        self.failed += 1;
        self.had_assertion |= kind == CheckKind::Assertion;
        let styles = self.styles();
        let start = self.text.len();
        swrite!(
            self.text,
            "\t{} failed at {}:{} {}: {}\n",
            kind.label(),
            location.file(),
            location.line(),
            "failed".style(styles.fail),
            message.style(styles.message),
        );
        self.forward(start);
    }

    /// Records a panic that escaped the test body.
    ///
    /// This does not count as a check failure: the child aborts right afterwards, and the
    /// parent classifies the case by the abort signal.
    pub fn record_panic(&mut self, location: Option<&Location<'_>>, message: &str) {
        let styles = self.styles();
        let panicked = "panicked".style(styles.fail);
        let start = self.text.len();
        match location {
            Some(location) => swrite!(
                self.text,
                "\t{panicked} at {}:{}: {message}\n",
                location.file(),
                location.line(),
            ),
            None => swrite!(self.text, "\t{panicked}: {message}\n"),
        }
        self.forward(start);
    }

    /// Returns the formatted lines recorded so far.
    pub fn contents(&self) -> &str {
        &self.text
    }

    /// Returns the number of successful checks.
    pub fn passed(&self) -> usize {
        self.passed
    }

    /// Returns the number of failed checks.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Returns the exit code the child process should terminate with.
    pub fn exit_code(&self) -> i32 {
        CaseExitCode::from_failures(self.failed, self.had_assertion)
    }

    fn forward(&mut self, start: usize) {
        let Some(sink) = &mut self.sink else {
            return;
        };
        if let Err(err) = sink.write_all(self.text[start..].as_bytes()) {
            warn!("failed to send check output to the harness: {err}");
            self.sink = None;
        }
    }

    fn styles(&self) -> CheckStyles {
        let mut styles = CheckStyles::default();
        if self.colorize {
            styles.colorize();
        }
        styles
    }
}

impl Default for CaseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct CheckStyles {
    pass: Style,
    fail: Style,
    message: Style,
}

impl CheckStyles {
    fn colorize(&mut self) {
        self.pass = Style::new().green();
        self.fail = Style::new().red();
        self.message = Style::new().yellow().bold();
    }
}

static BUFFER: Mutex<CaseBuffer> = Mutex::new(CaseBuffer::new());

/// Runs `f` against this process's [`CaseBuffer`].
///
/// `f` must not panic: the panic hook installed in test children also writes to the buffer.
pub fn with_buffer<T>(f: impl FnOnce(&mut CaseBuffer) -> T) -> T {
    let mut guard = BUFFER.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Starts an expectation on `actual`.
#[track_caller]
pub fn expect_that<T: fmt::Debug>(actual: T) -> Check<T> {
    Check::new(actual, CheckKind::Expect, Location::caller())
}

/// Starts an assertion on `actual`.
#[track_caller]
pub fn assert_that<T: fmt::Debug>(actual: T) -> Check<T> {
    Check::new(actual, CheckKind::Assertion, Location::caller())
}

/// Starts an expectation that applies to every item in `items`.
#[track_caller]
pub fn expect_each<I>(items: I) -> EachCheck<I::Item>
where
    I: IntoIterator,
    I::Item: fmt::Debug,
{
    EachCheck::new(items, CheckKind::Expect, Location::caller())
}

/// Starts an assertion that applies to every item in `items`.
///
/// The first failing item stops the test body.
#[track_caller]
pub fn assert_each<I>(items: I) -> EachCheck<I::Item>
where
    I: IntoIterator,
    I::Item: fmt::Debug,
{
    EachCheck::new(items, CheckKind::Assertion, Location::caller())
}

/// A pending check on a single value.
#[must_use = "a check does nothing until a comparison is applied"]
#[derive(Debug)]
pub struct Check<T> {
    actual: T,
    kind: CheckKind,
    location: &'static Location<'static>,
}

impl<T: fmt::Debug> Check<T> {
    fn new(actual: T, kind: CheckKind, location: &'static Location<'static>) -> Self {
        Self {
            actual,
            kind,
            location,
        }
    }

    /// Checks that the value is equal to `expected`.
    pub fn to_equal<U: fmt::Debug>(self, expected: U)
    where
        T: PartialEq<U>,
    {
        let ok = self.actual == expected;
        compare(self.kind, self.location, ok, &self.actual, "equal to", &expected);
    }

    /// Checks that the value is not equal to `expected`.
    pub fn to_not_equal<U: fmt::Debug>(self, expected: U)
    where
        T: PartialEq<U>,
    {
        let ok = self.actual != expected;
        compare(
            self.kind,
            self.location,
            ok,
            &self.actual,
            "not equal to",
            &expected,
        );
    }

    /// Checks that the value is greater than `expected`.
    pub fn to_be_greater_than<U: fmt::Debug>(self, expected: U)
    where
        T: PartialOrd<U>,
    {
        let ok = self.actual > expected;
        compare(
            self.kind,
            self.location,
            ok,
            &self.actual,
            "greater than",
            &expected,
        );
    }

    /// Checks that the value is less than `expected`.
    pub fn to_be_less_than<U: fmt::Debug>(self, expected: U)
    where
        T: PartialOrd<U>,
    {
        let ok = self.actual < expected;
        compare(self.kind, self.location, ok, &self.actual, "less than", &expected);
    }

    /// Checks that the container holds `item`.
    pub fn to_contain<E>(self, item: E)
    where
        T: AsRef<[E]>,
        E: PartialEq + fmt::Debug,
    {
        let ok = self.actual.as_ref().contains(&item);
        contain(self.kind, self.location, ok, "have", &item);
    }

    /// Checks that the container does not hold `item`.
    pub fn to_not_contain<E>(self, item: E)
    where
        T: AsRef<[E]>,
        E: PartialEq + fmt::Debug,
    {
        let ok = !self.actual.as_ref().contains(&item);
        contain(self.kind, self.location, ok, "not have", &item);
    }
}

/// A pending check applied to every item of a collection.
#[must_use = "a check does nothing until a comparison is applied"]
#[derive(Debug)]
pub struct EachCheck<T> {
    items: Vec<T>,
    kind: CheckKind,
    location: &'static Location<'static>,
}

impl<T: fmt::Debug> EachCheck<T> {
    fn new(
        items: impl IntoIterator<Item = T>,
        kind: CheckKind,
        location: &'static Location<'static>,
    ) -> Self {
        Self {
            items: items.into_iter().collect(),
            kind,
            location,
        }
    }

    /// Checks that every item is equal to `expected`.
    pub fn to_equal<U: fmt::Debug>(self, expected: U)
    where
        T: PartialEq<U>,
    {
        for item in &self.items {
            compare(self.kind, self.location, *item == expected, item, "equal to", &expected);
        }
    }

    /// Checks that every item is greater than `expected`.
    pub fn to_be_greater_than<U: fmt::Debug>(self, expected: U)
    where
        T: PartialOrd<U>,
    {
        for item in &self.items {
            compare(
                self.kind,
                self.location,
                *item > expected,
                item,
                "greater than",
                &expected,
            );
        }
    }

    /// Checks that every item is less than `expected`.
    pub fn to_be_less_than<U: fmt::Debug>(self, expected: U)
    where
        T: PartialOrd<U>,
    {
        for item in &self.items {
            compare(self.kind, self.location, *item < expected, item, "less than", &expected);
        }
    }
}

fn compare<T: fmt::Debug + ?Sized, U: fmt::Debug + ?Sized>(
    kind: CheckKind,
    location: &Location<'_>,
    ok: bool,
    actual: &T,
    operation: &str,
    expected: &U,
) {
    // Format outside the buffer lock: a Debug impl is user code and may panic.
    let message = (!ok).then(|| format!("Expected `{actual:?}' to be {operation} `{expected:?}'"));
    conclude(kind, location, message);
}

fn contain<E: fmt::Debug>(
    kind: CheckKind,
    location: &Location<'_>,
    ok: bool,
    operation: &str,
    item: &E,
) {
    let message = (!ok).then(|| format!("Expected container to {operation} `{item:?}'"));
    conclude(kind, location, message);
}

fn conclude(kind: CheckKind, location: &Location<'_>, failure: Option<String>) {
    match failure {
        None => with_buffer(|buffer| buffer.record_pass(kind, location)),
        Some(message) => {
            with_buffer(|buffer| buffer.record_failure(kind, location, &message));
            if kind == CheckKind::Assertion {
                std::panic::panic_any(AssertionFailed);
            }
        }
    }
}
