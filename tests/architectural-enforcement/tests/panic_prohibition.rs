//! Integration Test: Panic Prohibition
//!
//! **Policy**: Production code propagates errors with `?` and typed errors.
//! `unwrap()` and `expect()` are only allowed in tests.

use architectural_enforcement::{production_sources, report, SourceLine};

#[test]
fn test_no_unwrap_or_expect_in_production_code() {
    let violations: Vec<SourceLine> = production_sources()
        .into_iter()
        .filter(|l| l.code.contains(".unwrap()") || l.code.contains(".expect("))
        .collect();

    report("unwrap()/expect() in production code", &violations);
}
