//! Tool version compatibility policy.
//!
//! The central design decision of the snapshot subsystem: behavior matters
//! more than bytes. Tools whose version can change observable build or test
//! behavior demand matching versions; plumbing tools only need to exist.

use serde::{Deserialize, Serialize};

/// Tools where version differences can change observable behavior:
/// interpreters, package managers and lockers, formatters, linters, type
/// checkers and test runners.
const VERSION_CRITICAL: &[&str] = &[
    "python",
    "python3",
    "pip",
    "pip3",
    "uv",
    "poetry",
    "pipenv",
    "pdm",
    "hatch",
    "black",
    "ruff",
    "isort",
    "flake8",
    "pylint",
    "mypy",
    "pyright",
    "pytest",
    "tox",
    "node",
    "npm",
    "yarn",
    "pnpm",
    "tsc",
    "rustc",
    "cargo",
    "go",
    "git",
];

/// Tools whose observable behavior does not depend on the exact version for
/// our purposes.
const BEHAVIOR_COMPATIBLE: &[&str] = &[
    "curl", "wget", "make", "tar", "gzip", "bzip2", "xz", "zip", "unzip", "7z", "grep", "sed",
    "awk", "jq", "yq", "openssl", "ssh", "rsync", "cat", "ls", "find",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolClass {
    VersionCritical,
    BehaviorCompatible,
}

/// Classifies a tool by name. Unknown tools are treated as version-critical
/// so that drift is reported rather than silently accepted.
pub fn classify_tool(tool: &str) -> ToolClass {
    if BEHAVIOR_COMPATIBLE.contains(&tool) {
        ToolClass::BehaviorCompatible
    } else {
        ToolClass::VersionCritical
    }
}

/// The curated version-critical tool set; this is also the subset of the
/// registry whose versions and paths get recorded into snapshots.
pub fn version_critical_tools() -> &'static [&'static str] {
    VERSION_CRITICAL
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionMode {
    Strict,
    #[default]
    Lenient,
}

/// Outcome of a version comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Versions are identical.
    Exact,
    /// Versions differ but the policy accepts the drift; callers emit a
    /// warning.
    Compatible,
    Incompatible,
}

impl Compatibility {
    pub fn is_acceptable(self) -> bool {
        !matches!(self, Self::Incompatible)
    }
}

/// Compares an expected against an actual version under the policy.
///
/// Behavior-compatible tools always pass. Version-critical tools demand
/// equality in strict mode; in lenient mode the major version must match
/// and minor drift is accepted with a warning.
pub fn compare_versions(
    expected: &str,
    actual: &str,
    class: ToolClass,
    mode: VersionMode,
) -> Compatibility {
    if expected == actual {
        return Compatibility::Exact;
    }
    if class == ToolClass::BehaviorCompatible {
        return Compatibility::Compatible;
    }
    match mode {
        VersionMode::Strict => Compatibility::Incompatible,
        VersionMode::Lenient => match (major_of(expected), major_of(actual)) {
            (Some(expected_major), Some(actual_major)) if expected_major == actual_major => {
                Compatibility::Compatible
            }
            _ => Compatibility::Incompatible,
        },
    }
}

fn major_of(version: &str) -> Option<u64> {
    version
        .split(['.', '-', '+'])
        .next()?
        .trim()
        .parse()
        .ok()
}
