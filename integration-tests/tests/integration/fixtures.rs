// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use integration_tests::report::{Report, Summary, Verdict};

/// A case registered by `extest-fixtures`, and how it is expected to be reported.
pub struct ExpectedCase {
    pub name: &'static str,
    pub verdict: Verdict,
    pub reason: Option<&'static str>,
}

impl ExpectedCase {
    const fn passed(name: &'static str) -> Self {
        Self {
            name,
            verdict: Verdict::Passed,
            reason: None,
        }
    }

    const fn failed(name: &'static str, reason: &'static str) -> Self {
        Self {
            name,
            verdict: Verdict::Failed,
            reason: Some(reason),
        }
    }

    const fn aborted(name: &'static str, reason: &'static str) -> Self {
        Self {
            name,
            verdict: Verdict::Aborted,
            reason: Some(reason),
        }
    }
}

pub static EXPECTED_ALL: &[ExpectedCase] = &[
    ExpectedCase::passed("Math::Add"),
    ExpectedCase::failed("Math::AddWrong", "a failed expect."),
    ExpectedCase::passed("ExTest::SelfTest"),
    ExpectedCase::failed("Checks::FailingExpect", "a failed expect."),
    ExpectedCase::failed("Checks::FailingAssertion", "a failed assertion."),
    ExpectedCase::passed("Checks::ManyPasses"),
    ExpectedCase::aborted(
        "Crash::DivByZero",
        "a programming error: division by zero.",
    ),
    ExpectedCase::aborted("Crash::Null", "a programming error: segmentation fault."),
    ExpectedCase::aborted("Crash::Panic", "a programming error: abort."),
    ExpectedCase::aborted(
        "Crash::FailThenFault",
        "a programming error: segmentation fault.",
    ),
    ExpectedCase::passed("Math::Sub"),
];

pub static EXPECTED_PASSING: &[ExpectedCase] = &[
    ExpectedCase::passed("Math::Add"),
    ExpectedCase::passed("ExTest::SelfTest"),
    ExpectedCase::passed("Math::Sub"),
];

pub const ALL_SUMMARY: Summary = Summary {
    passed: 4,
    failed: 3,
    aborted: 4,
};

/// Checks that `report` lists `expected` in registration order with matching verdicts.
#[track_caller]
pub fn check_report(report: &Report, expected: &[ExpectedCase]) {
    let expected_names: Vec<_> = expected.iter().map(|case| case.name).collect();
    assert_eq!(report.names(), expected_names, "cases run in registration order");

    for (case, expected) in report.cases.iter().zip(expected) {
        assert_eq!(case.verdict, expected.verdict, "verdict for {}", case.name);
        assert_eq!(
            case.reason.as_deref(),
            expected.reason,
            "reason for {}",
            case.name
        );
        if case.verdict == Verdict::Passed {
            assert!(
                case.details.is_empty(),
                "passed case {} has no details: {:?}",
                case.name,
                case.details
            );
        }
    }
}
