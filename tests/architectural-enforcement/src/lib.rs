//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! on the chorus crates:
//! - No blocking sleeps in production code
//! - Async I/O everywhere except configuration loading
//! - No `unwrap()` / `expect()` outside tests
//!
//! The helpers below locate production sources and strip comments and test
//! modules so each policy test only inspects shipped code.

use std::fs;
use std::path::{Path, PathBuf};

/// Directories holding production code, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["chorus/core/src", "chorus/cli/src"];

/// One line of production code
#[derive(Debug, Clone)]
pub struct SourceLine {
    /// File the line came from
    pub path: PathBuf,
    /// 1-based line number
    pub number: usize,
    /// The line with any `//` comment removed
    pub code: String,
    /// The untouched line
    pub raw: String,
}

impl std::fmt::Display for SourceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.number, self.raw.trim())
    }
}

/// Workspace root, two levels above this package
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

/// Strip a trailing `//` comment (doc comments become empty)
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Production lines of one file: everything before the first `#[cfg(test)]`
pub fn production_lines(path: &Path) -> Vec<SourceLine> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    content
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .map(|(idx, line)| SourceLine {
            path: path.to_path_buf(),
            number: idx + 1,
            code: code_part(line).to_string(),
            raw: line.to_string(),
        })
        .collect()
}

/// Every production line under [`PRODUCTION_DIRS`]
pub fn production_sources() -> Vec<SourceLine> {
    let root = workspace_root();
    let mut lines = Vec::new();

    for dir in PRODUCTION_DIRS {
        let path = root.join(dir);
        if !path.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                lines.extend(production_lines(entry.path()));
            }
        }
    }

    lines
}

/// Panic with a readable report if any violations were found
pub fn report(policy: &str, violations: &[SourceLine]) {
    if violations.is_empty() {
        return;
    }

    eprintln!("\n❌ {policy}\n");
    for violation in violations {
        eprintln!("  ❌ {violation}");
    }
    panic!(
        "\nFound {} violation(s) of: {policy}\nFix these before merging!",
        violations.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("let x = 1; // note"), "let x = 1; ");
        assert_eq!(code_part("//! docs"), "");
    }

    #[test]
    fn test_production_sources_found() {
        let lines = production_sources();
        assert!(
            lines.iter().any(|l| l.path.ends_with("lib.rs")),
            "expected to scan chorus sources from {}",
            workspace_root().display()
        );
    }
}
