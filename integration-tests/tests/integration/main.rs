// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that run the `extest-fixtures` harness binary and parse its report.

use extest_metadata::ExtestExitCode;
use integration_tests::{
    harness_cli::HarnessCli,
    report::{Summary, Verdict},
};
use pretty_assertions::assert_eq;
use test_case::test_case;

mod fixtures;

use fixtures::*;

const FIXTURES_BIN: &str = env!("CARGO_BIN_EXE_extest-fixtures");

fn fixtures_cli() -> HarnessCli {
    HarnessCli::new(FIXTURES_BIN)
}

#[test]
fn test_run_all() {
    let output = fixtures_cli().unchecked(true).output();
    assert_eq!(
        output.exit_status.code(),
        Some(ExtestExitCode::TEST_RUN_FAILED),
        "{output}"
    );

    let report = output.report().unwrap();
    check_report(&report, EXPECTED_ALL);
    assert_eq!(report.summary, ALL_SUMMARY, "{output}");
}

#[test]
fn test_run_passing() {
    let output = fixtures_cli().env("EXTEST_FIXTURE_SET", "passing").output();
    assert_eq!(output.exit_status.code(), Some(ExtestExitCode::OK));

    let report = output.report().unwrap();
    check_report(&report, EXPECTED_PASSING);
    assert_eq!(
        report.summary,
        Summary {
            passed: 3,
            failed: 0,
            aborted: 0,
        }
    );

    // Rows for zero counters are left out.
    let stdout = output.stdout_as_str();
    assert!(!stdout.contains("Failed"), "{output}");
    assert!(!stdout.contains("Aborted"), "{output}");
}

#[test]
fn test_repeated_runs_agree() {
    let first = fixtures_cli().unchecked(true).output().report().unwrap();
    let second = fixtures_cli().unchecked(true).output().report().unwrap();
    assert_eq!(first.names(), second.names());
    assert_eq!(first.summary, second.summary);
}

#[test]
fn test_failed_expectations_are_all_reported() {
    let output = fixtures_cli().unchecked(true).output();
    let report = output.report().unwrap();

    let case = report.case("Checks::FailingExpect").unwrap();
    let failures = case
        .details
        .iter()
        .filter(|line| line.starts_with("\tExpect failed at "))
        .count();
    assert_eq!(failures, 2, "{output}");
    assert!(
        case.details
            .iter()
            .any(|line| line.starts_with("\tExpect passed at ")),
        "the expectation after the failures still runs: {output}"
    );

    let add_wrong = report.case("Math::AddWrong").unwrap();
    assert_eq!(add_wrong.details.len(), 1, "{output}");
    assert!(add_wrong.details[0].contains("4"), "{output}");
    assert!(add_wrong.details[0].contains("5"), "{output}");
}

#[test]
fn test_failed_assertion_stops_the_body() {
    let output = fixtures_cli().unchecked(true).output();
    let report = output.report().unwrap();

    let case = report.case("Checks::FailingAssertion").unwrap();
    assert_eq!(case.details.len(), 1, "{output}");
    assert!(
        case.details[0].starts_with("\tAssertion failed at "),
        "{output}"
    );
    assert!(!output.stdout_as_str().contains("never checked"), "{output}");
}

#[test_case(false ; "traced")]
#[test_case(true ; "untraced")]
fn test_crash_diagnostics(no_trace: bool) {
    let mut cli = fixtures_cli();
    cli.unchecked(true);
    if no_trace {
        cli.args(["--no-trace"]);
    }
    let output = cli.output();
    let report = output.report().unwrap();

    for name in [
        "Crash::DivByZero",
        "Crash::Null",
        "Crash::Panic",
        "Crash::FailThenFault",
    ] {
        let case = report.case(name).unwrap();
        assert_eq!(case.verdict, Verdict::Aborted, "{output}");
        let diagnostic = case.details.first().unwrap();
        assert!(
            diagnostic.starts_with("\tProgram error in file "),
            "diagnostic for {name}: {output}"
        );
        if no_trace {
            assert!(
                diagnostic.contains("Unable to determine context!"),
                "untraced crashes have no location: {output}"
            );
        }
    }

    // Crashes don't disturb the cases around them.
    assert_eq!(report.summary, ALL_SUMMARY, "{output}");
}

#[test]
fn test_fault_overrides_failed_expectation() {
    let output = fixtures_cli().unchecked(true).output();
    let report = output.report().unwrap();

    let case = report.case("Crash::FailThenFault").unwrap();
    assert_eq!(case.verdict, Verdict::Aborted, "{output}");
    assert!(
        case.details[0].starts_with("\tProgram error in file "),
        "diagnostic comes first: {output}"
    );
    assert!(
        case.details
            .iter()
            .any(|line| line.starts_with("\tExpect failed at ")),
        "the failure recorded before the fault is printed: {output}"
    );

    // Tallied once, as aborted only.
    assert_eq!(report.summary.total(), EXPECTED_ALL.len(), "{output}");
}

#[test]
fn test_panic_output_is_captured() {
    let output = fixtures_cli().unchecked(true).output();
    let report = output.report().unwrap();

    let case = report.case("Crash::Panic").unwrap();
    assert!(
        case.details
            .iter()
            .any(|line| line.starts_with("\tpanicked at ")
                && line.ends_with("fixture panicked with 0 values")),
        "{output}"
    );
    assert!(
        case.details
            .iter()
            .any(|line| line.starts_with("\tExpect passed at ")),
        "checks before the panic are kept: {output}"
    );
}

#[test]
fn test_list() {
    let output = fixtures_cli().arg("--list").output();
    let expected: Vec<_> = EXPECTED_ALL.iter().map(|case| case.name).collect();
    assert_eq!(output.stdout_as_str().lines().collect::<Vec<_>>(), expected);
}

#[test]
fn test_verbose() {
    let output = fixtures_cli()
        .env("EXTEST_FIXTURE_SET", "passing")
        .arg("--verbose")
        .output();
    let stdout = output.stdout_as_str();

    assert!(stdout.starts_with("    Starting 3 test cases\n"), "{output}");
    for line in stdout.lines().filter(|line| line.contains("Test case ")) {
        assert!(line.starts_with('['), "duration prefix: {output}");
    }
    assert!(
        stdout.lines().any(|line| line.trim_start().starts_with("Finished [")),
        "{output}"
    );

    let report = output.report().unwrap();
    check_report(&report, EXPECTED_PASSING);
}

#[test]
fn test_invalid_arguments() {
    let output = fixtures_cli()
        .arg("--no-such-flag")
        .unchecked(true)
        .output();
    assert_eq!(output.exit_status.code(), Some(2), "clap usage errors: {output}");
    assert!(output.stdout.is_empty(), "{output}");
    assert!(output.stderr_as_str().contains("--no-such-flag"), "{output}");
}
