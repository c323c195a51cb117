//! Test orchestration (C8): after a successful build, run every target
//! whose atom ends `-test` and report pass/fail counts.

use std::path::Path;
use std::process::Command;

use owo_colors::OwoColorize;

use crate::spec::Spec;

pub struct TestOutcome {
    pub relpath: String,
    pub passed: bool,
}

/// Run every spec whose atom ends `-test`, classifying by exit status.
pub fn run_tests(out_root: &Path, specs: &[Spec]) -> Vec<TestOutcome> {
    specs
        .iter()
        .filter(|s| s.atom.ends_with("-test"))
        .map(|spec| {
            let artifact = out_root.join(spec.relpath());
            let passed = Command::new(&artifact)
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            TestOutcome {
                relpath: spec.relpath().display().to_string(),
                passed,
            }
        })
        .collect()
}

/// Print one line per pass/fail class with counts and relpaths, and return
/// whether every test passed.
pub fn report(outcomes: &[TestOutcome]) -> bool {
    let (passed, failed): (Vec<_>, Vec<_>) = outcomes.iter().partition(|o| o.passed);

    println!(
        "{}",
        format!("{} passed", passed.len()).green()
    );
    for outcome in &passed {
        println!("  {}", outcome.relpath.green());
    }

    if !failed.is_empty() {
        println!("{}", format!("{} failed", failed.len()).red());
        for outcome in &failed {
            println!("  {}", outcome.relpath.red());
        }
    }

    failed.is_empty()
}
