// Copyright (c) The extest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::ExpectedError,
    output::{OutputContext, OutputOpts, clap_styles},
    registry::Registry,
    reporter::TestReporterBuilder,
    runner::TestRunnerBuilder,
    symbolize::SymbolResolver,
    write_str::WriteStr,
};
use clap::Parser;
use extest_metadata::ExtestExitCode;
use std::io::{self, BufWriter};

/// Runs each registered test case in its own process, and diagnoses crashes.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct HarnessApp {
    #[clap(flatten)]
    output: OutputOpts,

    /// Run test cases without tracing them; crashes are reported without a location
    #[arg(long, env = "EXTEST_NO_TRACE")]
    no_trace: bool,

    /// List registered test cases instead of running them
    #[arg(long)]
    list: bool,
}

impl HarnessApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app against `registry`, writing the report to `out`.
    ///
    /// Returns the process exit code on success.
    pub fn exec(
        self,
        registry: &Registry,
        output: OutputContext,
        mut out: impl WriteStr,
    ) -> Result<i32, ExpectedError> {
        if self.list {
            for case in registry.all() {
                writeln!(out, "{case}").map_err(ExpectedError::write_output)?;
            }
            out.write_str_flush().map_err(ExpectedError::write_output)?;
            return Ok(ExtestExitCode::OK);
        }

        let colorize = output.color.should_colorize(supports_color::Stream::Stdout);

        let mut resolver = SymbolResolver::new();
        if colorize {
            resolver.colorize();
        }
        let runner = TestRunnerBuilder::default()
            .set_trace(!self.no_trace)
            .set_colorize_checks(colorize)
            .build(registry, resolver);

        let mut reporter = TestReporterBuilder::default()
            .set_verbose(output.verbose)
            .build(out);
        if colorize {
            reporter.colorize();
        }
        if supports_unicode::on(supports_unicode::Stream::Stdout) {
            reporter.use_unicode();
        }

        let run_stats = runner
            .try_execute(|event| reporter.report_event(event))
            .map_err(ExpectedError::write_output)?;

        if run_stats.is_success() {
            Ok(ExtestExitCode::OK)
        } else {
            Ok(ExtestExitCode::TEST_RUN_FAILED)
        }
    }
}

/// The entry point of a test harness binary.
///
/// Parses the command line, lets `setup` register test cases, runs every case in its own
/// process, prints the report to stdout, and exits the process with the harness exit code.
///
/// ```no_run
/// use extest_runner::{checks::assert_that, harness_main};
///
/// fn math_add() {
///     assert_that(2 + 2).to_equal(4);
/// }
///
/// fn main() {
///     harness_main(|registry| {
///         registry.register(math_add, "Math", "Add");
///     })
/// }
/// ```
pub fn harness_main(setup: impl FnOnce(&mut Registry)) -> ! {
    let app = HarnessApp::parse();
    let output = app.init_output();

    let mut registry = Registry::new();
    setup(&mut registry);

    match app.exec(&registry, output, BufWriter::new(io::stdout())) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            error.display_to_stderr();
            std::process::exit(error.process_exit_code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Color;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_app() {
        HarnessApp::command().debug_assert();
    }

    #[test]
    fn test_argument_parsing() {
        let valid: &[&str] = &[
            "harness",
            "harness --list",
            "harness --verbose",
            "harness -v --color never",
            "harness --color=always",
            "harness --no-trace",
            "harness --no-trace --color auto -v",
        ];
        for args in valid {
            if let Err(err) = HarnessApp::try_parse_from(args.split_whitespace()) {
                panic!("{args} should have parsed successfully, but didn't: {err}");
            }
        }

        let invalid: &[&str] = &[
            "harness --color sometimes",
            "harness --filter Math",
            "harness Math::Add",
        ];
        for args in invalid {
            assert!(
                HarnessApp::try_parse_from(args.split_whitespace()).is_err(),
                "{args} should have failed to parse"
            );
        }
    }

    #[test]
    fn parsed_flags() {
        let app = HarnessApp::try_parse_from(["harness", "-v", "--color", "never", "--no-trace"])
            .unwrap();
        assert!(app.output.verbose);
        assert_eq!(app.output.color, Color::Never);
        assert!(app.no_trace);
        assert!(!app.list);
    }

    #[test]
    fn list_prints_cases_in_registration_order() {
        fn noop() {}

        let mut registry = Registry::new();
        registry
            .register(noop, "Math", "Add")
            .register(noop, "Math", "AddWrong")
            .register(noop, "Crash", "Null");

        let app = HarnessApp::try_parse_from(["harness", "--list"]).unwrap();
        let output = OutputContext {
            verbose: false,
            color: Color::Never,
        };
        let mut out = String::new();
        let code = app.exec(&registry, output, &mut out).unwrap();

        assert_eq!(code, ExtestExitCode::OK);
        assert_eq!(out, "Math::Add\nMath::AddWrong\nCrash::Null\n");
    }
}
