// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for extest-runner.

use std::fmt;

/// Utilities for pluralizing various words based on count or plurality.
pub mod plural {
    /// Returns "test case" if `count` is 1, otherwise "test cases".
    pub fn test_cases_str(count: usize) -> &'static str {
        if count == 1 { "test case" } else { "test cases" }
    }
}

/// Returns the abbreviated name of a signal, without the `SIG` prefix.
pub(crate) fn signal_str(signal: i32) -> Option<&'static str> {
    // These signal numbers are the same on at least Linux, macOS, FreeBSD and illumos.
    match signal {
        1 => Some("HUP"),
        2 => Some("INT"),
        3 => Some("QUIT"),
        4 => Some("ILL"),
        5 => Some("TRAP"),
        6 => Some("ABRT"),
        7 if cfg!(target_os = "linux") => Some("BUS"),
        8 => Some("FPE"),
        9 => Some("KILL"),
        11 => Some("SEGV"),
        13 => Some("PIPE"),
        14 => Some("ALRM"),
        15 => Some("TERM"),
        _ => None,
    }
}

/// Displays a signal number along with its name, e.g. `11 (SIGSEGV)`.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DisplaySignal(pub(crate) i32);

impl fmt::Display for DisplaySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match signal_str(self.0) {
            Some(name) => write!(f, "{} (SIG{name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Characters used to draw the summary box.
///
/// Provides both ASCII and Unicode variants.
#[derive(Clone, Debug)]
pub struct BoxCharacters {
    top_left: char,
    top_right: char,
    bottom_left: char,
    bottom_right: char,
    top: char,
    bottom: char,
    left: char,
    right: char,
}

impl Default for BoxCharacters {
    fn default() -> Self {
        Self {
            top_left: '+',
            top_right: '+',
            bottom_left: '+',
            bottom_right: '+',
            top: '-',
            bottom: '-',
            left: '|',
            right: '|',
        }
    }
}

impl BoxCharacters {
    /// Switches to Unicode box-drawing characters.
    pub fn use_unicode(&mut self) {
        // The right and bottom edges are heavy, giving the box a drop shadow.
        self.top_left = '┌';
        self.top_right = '┒';
        self.bottom_left = '┕';
        self.bottom_right = '┛';
        self.top = '─';
        self.bottom = '━';
        self.left = '│';
        self.right = '┃';
    }

    pub(crate) fn top_left(&self) -> char {
        self.top_left
    }

    pub(crate) fn top_right(&self) -> char {
        self.top_right
    }

    pub(crate) fn bottom_left(&self) -> char {
        self.bottom_left
    }

    pub(crate) fn bottom_right(&self) -> char {
        self.bottom_right
    }

    pub(crate) fn left(&self) -> char {
        self.left
    }

    pub(crate) fn right(&self) -> char {
        self.right
    }

    /// Returns a run of the top edge character of the specified width.
    pub(crate) fn top(&self, width: usize) -> String {
        std::iter::repeat_n(self.top, width).collect()
    }

    /// Returns a run of the bottom edge character of the specified width.
    pub(crate) fn bottom(&self, width: usize) -> String {
        std::iter::repeat_n(self.bottom, width).collect()
    }
}
