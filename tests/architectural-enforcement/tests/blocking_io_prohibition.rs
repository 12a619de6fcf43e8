//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Production code MUST NOT use blocking I/O inside the runtime.
//! **Required**: `tokio::fs`, async `reqwest`, not `std::fs` or `reqwest::blocking`.
//!
//! Configuration loading is the one exception: it runs before any provider
//! stream starts, so `config/` may read its TOML file with `std::fs`.

use architectural_enforcement::{production_sources, report, SourceLine};

/// Paths allowed to use `std::fs`
const STD_FS_ALLOWED: &[&str] = &["config"];

fn allows_std_fs(line: &SourceLine) -> bool {
    line.path
        .components()
        .any(|c| STD_FS_ALLOWED.iter().any(|allowed| c.as_os_str() == *allowed))
}

#[test]
fn test_no_blocking_fs_outside_config() {
    let violations: Vec<SourceLine> = production_sources()
        .into_iter()
        .filter(|l| l.code.contains("std::fs") && !allows_std_fs(l))
        .collect();

    report("Blocking file I/O outside config/ (use tokio::fs)", &violations);
}

#[test]
fn test_no_blocking_http_client() {
    let violations: Vec<SourceLine> = production_sources()
        .into_iter()
        .filter(|l| l.code.contains("reqwest::blocking"))
        .collect();

    report("Blocking HTTP client (use async reqwest)", &violations);
}

#[test]
fn test_no_blocking_network_io() {
    let violations: Vec<SourceLine> = production_sources()
        .into_iter()
        .filter(|l| l.code.contains("std::net::"))
        .collect();

    report("Blocking network I/O (use tokio::net)", &violations);
}
