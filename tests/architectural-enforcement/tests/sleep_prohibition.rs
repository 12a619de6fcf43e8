//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT block a runtime worker with
//! `std::thread::sleep`. Timed waits go through `tokio::time`.

use architectural_enforcement::{production_sources, report, SourceLine};

#[test]
fn test_no_thread_sleep_in_production_code() {
    let violations: Vec<SourceLine> = production_sources()
        .into_iter()
        .filter(|l| l.code.contains("thread::sleep"))
        .collect();

    report("Blocking sleep in production code (use tokio::time::sleep)", &violations);
}
