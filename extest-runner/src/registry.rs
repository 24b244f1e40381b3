// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The list of test cases known to a harness.
//!
//! Test cases are registered explicitly: [`harness_main`](crate::harness_main) hands a
//! `&mut Registry` to a setup closure before anything runs, and the registry is only read from
//! that point on.

use std::fmt;

/// The entry point of a test case.
pub type TestEntryPoint = fn();

/// A single registered test case.
#[derive(Clone, Copy)]
pub struct TestCase {
    suite: &'static str,
    name: &'static str,
    entry_point: TestEntryPoint,
}

impl TestCase {
    /// Creates a new test case.
    pub fn new(entry_point: TestEntryPoint, suite: &'static str, name: &'static str) -> Self {
        Self {
            suite,
            name,
            entry_point,
        }
    }

    /// Returns the name of the suite this case belongs to.
    pub fn suite(&self) -> &'static str {
        self.suite
    }

    /// Returns the name of the case within its suite.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the test body in the current process.
    pub fn run(&self) {
        (self.entry_point)()
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("suite", &self.suite)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.suite, self.name)
    }
}

/// An ordered, append-only list of test cases.
///
/// Duplicate `(suite, name)` pairs are allowed; each registration runs independently.
#[derive(Clone, Debug, Default)]
pub struct Registry {
    cases: Vec<TestCase>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a test case.
    pub fn register(
        &mut self,
        entry_point: TestEntryPoint,
        suite: &'static str,
        name: &'static str,
    ) -> &mut Self {
        self.cases.push(TestCase::new(entry_point, suite, name));
        self
    }

    /// Returns every registered test case, in registration order.
    pub fn all(&self) -> &[TestCase] {
        &self.cases
    }

    /// Returns the number of registered test cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if no test cases were registered.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }
}
