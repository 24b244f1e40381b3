// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for the report a harness prints to stdout.

use color_eyre::{
    Result,
    eyre::{bail, eyre},
};

/// The verdict printed in a status line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    Passed,
    Failed,
    Aborted,
}

/// A status line and the detail lines printed under it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaseReport {
    /// `suite::case`.
    pub name: String,
    pub verdict: Verdict,
    /// The text after "due to", if any.
    pub reason: Option<String>,
    /// Diagnostic and captured output lines, tabs included.
    pub details: Vec<String>,
}

/// The counters in the summary box.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub aborted: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.aborted
    }
}

/// A parsed harness report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Report {
    pub cases: Vec<CaseReport>,
    pub summary: Summary,
}

impl Report {
    /// Parses a report printed with `--color never`.
    pub fn parse(stdout: &str) -> Result<Self> {
        let mut report = Report::default();
        let mut in_summary = false;

        for line in stdout.lines() {
            if let Some(status) = status_line(line) {
                report.cases.push(parse_status(status)?);
            } else if line.contains("Test summary") {
                in_summary = true;
            } else if report.cases.is_empty() && line.trim_start().starts_with("Starting ") {
                // Verbose header.
            } else if in_summary {
                if let Some((label, count)) = summary_row(line) {
                    let count = count
                        .parse()
                        .map_err(|err| eyre!("invalid count in summary row {line:?}: {err}"))?;
                    match label {
                        "Passed" => report.summary.passed = count,
                        "Failed" => report.summary.failed = count,
                        "Aborted" => report.summary.aborted = count,
                        other => bail!("unknown summary row {other:?}"),
                    }
                }
            } else if !line.is_empty() {
                match report.cases.last_mut() {
                    Some(case) => case.details.push(line.to_owned()),
                    None => bail!("detail line {line:?} before the first status line"),
                }
            }
        }

        if !in_summary {
            bail!("report has no summary box");
        }
        Ok(report)
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|case| case.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.cases.iter().map(|case| case.name.as_str()).collect()
    }
}

/// Returns the part of `line` starting at "Test case", skipping a verbose duration prefix.
fn status_line(line: &str) -> Option<&str> {
    if let Some(status) = line.strip_prefix("Test case ") {
        return Some(status);
    }
    let (duration, rest) = line.split_once("] ")?;
    duration.starts_with('[').then_some(())?;
    rest.strip_prefix("Test case ")
}

fn parse_status(status: &str) -> Result<CaseReport> {
    let Some((name, tail)) = status.split_once(" is ") else {
        bail!("status line without a verdict: {status:?}");
    };
    let (verdict, reason) = match tail.split_once(" due to ") {
        Some((verdict, reason)) => (verdict, Some(reason.to_owned())),
        None => (tail.trim_end_matches('.'), None),
    };
    let verdict = match verdict {
        "passed" => Verdict::Passed,
        "failed" => Verdict::Failed,
        "aborted" => Verdict::Aborted,
        other => bail!("unknown verdict {other:?} in {status:?}"),
    };

    Ok(CaseReport {
        name: name.to_owned(),
        verdict,
        reason,
        details: Vec::new(),
    })
}

/// Extracts `(label, count)` from a summary row drawn with ASCII or Unicode characters.
fn summary_row(line: &str) -> Option<(&str, &str)> {
    let inner = line
        .trim()
        .strip_prefix(['|', '│'])?
        .strip_suffix(['|', '┃'])?;
    let mut words = inner.split_whitespace();
    let label = words.next()?;
    let count = words.next()?;
    words.next().is_none().then_some((label, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_ascii_report() {
        let stdout = "\n\
            Test case Math::Add is passed.\n\
            \n\
            Test case Math::AddWrong is failed due to a failed expect.\n\
            \tExpect failed at fixtures.rs:9 failed: Expected `4' to be equal to `5'\n\
            \n\
            Test case Crash::Null is aborted due to a programming error: segmentation fault.\n\
            \tProgram error in file /tmp/fixtures. Unable to determine context!\n\
            \n \
            +--- Test summary ---+\n \
            | Passed           1 |\n \
            | Failed           1 |\n \
            | Aborted          1 |\n \
            +--------------------+\n";

        let report = Report::parse(stdout).unwrap();
        assert_eq!(report.names(), ["Math::Add", "Math::AddWrong", "Crash::Null"]);
        assert_eq!(
            report.summary,
            Summary {
                passed: 1,
                failed: 1,
                aborted: 1
            }
        );

        let wrong = report.case("Math::AddWrong").unwrap();
        assert_eq!(wrong.verdict, Verdict::Failed);
        assert_eq!(wrong.reason.as_deref(), Some("a failed expect."));
        assert_eq!(wrong.details.len(), 1);

        let null = report.case("Crash::Null").unwrap();
        assert_eq!(null.verdict, Verdict::Aborted);
        assert!(null.details[0].starts_with("\tProgram error in file "));
    }

    #[test]
    fn parse_unicode_verbose_report() {
        let stdout = "    Starting 1 test case\n\
            \n\
            [   0.003s] Test case Math::Add is passed.\n\
            \n \
            ┌─── Test summary ───┒\n \
            │ Passed           1 ┃\n \
            ┕━━━━━━━━━━━━━━━━━━━━┛\n    \
            Finished [   0.004s] 1 test case run\n";

        let report = Report::parse(stdout).unwrap();
        assert_eq!(report.names(), ["Math::Add"]);
        assert_eq!(report.cases[0].verdict, Verdict::Passed);
        assert_eq!(report.summary.total(), 1);
    }

    #[test]
    fn output_before_first_status_is_an_error() {
        let stdout = "stray line\n\
            Test case Math::Add is passed.\n \
            +--- Test summary ---+\n \
            | Passed           1 |\n \
            +--------------------+\n";
        assert!(Report::parse(stdout).is_err());
    }

    #[test]
    fn missing_summary_is_an_error() {
        assert!(Report::parse("Test case Math::Add is passed.\n").is_err());
    }
}
