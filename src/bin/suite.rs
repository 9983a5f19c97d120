//! Aggregated suite runner.
//!
//! Runs every subsystem's smoke checks plus the slow end-to-end cases,
//! unless `--skip-functional` is present on the command line.

use testfix::suite::{full_suite, SuiteOptions, SuiteResult};

fn main() {
    let options = SuiteOptions::from_args(std::env::args().skip(1));

    let mut result = SuiteResult::default();
    full_suite(&options).run(&mut result);

    println!("{}", result.summary());
    for failure in &result.failures {
        eprintln!("FAIL {}: {}", failure.case, failure.message);
    }

    if !result.is_success() {
        std::process::exit(1);
    }
}
