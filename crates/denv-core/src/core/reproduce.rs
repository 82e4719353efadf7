//! Environment reproduction and verification.
//!
//! Walks a snapshot through the linear verification pipeline: platform,
//! interpreter, tools, project restoration, config verification, optional
//! dependency install. Every step may append warnings and continue; nothing
//! here retries (retries belong to the guardian) and nothing is fatal short
//! of the snapshot file itself being unreadable, which the caller handles.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use denv_domain::{
    classify_tool, compare_versions, extract_version, Compatibility, EnvironmentSnapshot,
    Platform, ReproductionResult, VersionMode,
};
use tracing::{debug, info};

use crate::core::process::{run, ProcessContext, RunRequest};
use crate::core::snapshot::capture::detect_interpreter;
use crate::core::snapshot::io::write_atomic;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const TOOL_CHECK_WORKERS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct ReproduceOptions {
    /// Directory to restore the project's lock and config files into.
    pub target: Option<PathBuf>,
    pub mode: VersionMode,
    /// Drive the package manager to sync dependencies after restoration.
    pub auto_install: bool,
    /// Refuse to proceed on a different platform instead of warning.
    pub require_same_platform: bool,
}

/// Verifies (and optionally restores) an environment against a snapshot.
pub fn reproduce(
    snapshot: &EnvironmentSnapshot,
    options: &ReproduceOptions,
    context: &ProcessContext,
) -> ReproductionResult {
    let host = Platform::current();
    let mut result = ReproductionResult::new(&snapshot.snapshot_id, host.as_str());
    // Tools whose drift the policy refuses; these fail the aggregate while
    // lenient-compatible drift only warns.
    let mut incompatible: BTreeSet<String> = BTreeSet::new();

    info!(id = %snapshot.snapshot_id, mode = ?options.mode, "reproducing environment");

    if !check_platform(snapshot, &host, options, &mut result) {
        return result;
    }
    check_python(snapshot, options.mode, context, &mut result, &mut incompatible);
    check_tools(snapshot, options.mode, context, &mut result, &mut incompatible);

    if let Some(target) = &options.target {
        restore_project(snapshot, target, &mut result);
        verify_configs(snapshot, target, &mut result);
        if options.auto_install {
            auto_install(snapshot, target, context, &mut result);
        }
    }

    result.success = result.actions_failed.is_empty()
        && result.missing_tools.is_empty()
        && result.tools_verified.values().all(|&verified| verified)
        && incompatible.is_empty();
    info!(
        id = %snapshot.snapshot_id,
        success = result.success,
        "environment reproduction finished"
    );
    result
}

/// Platform step. Returns false only under the explicit same-platform
/// policy; a mismatch otherwise proceeds with a warning and surfaces the
/// snapshot's platform notes verbatim.
fn check_platform(
    snapshot: &EnvironmentSnapshot,
    host: &Platform,
    options: &ReproduceOptions,
    result: &mut ReproductionResult,
) -> bool {
    if snapshot.platform == host.as_str() {
        return true;
    }
    if options.require_same_platform {
        result.actions_failed.push(format!(
            "platform mismatch: snapshot was captured on {}, host is {}",
            snapshot.platform, host
        ));
        return false;
    }
    result.warnings.push(format!(
        "Platform differs ({} -> {}); proceeding with platform-specific equivalents",
        snapshot.platform, host
    ));
    result.warnings.extend(snapshot.platform_notes.iter().cloned());
    true
}

fn check_python(
    snapshot: &EnvironmentSnapshot,
    mode: VersionMode,
    context: &ProcessContext,
    result: &mut ReproductionResult,
    incompatible: &mut BTreeSet<String>,
) {
    let Ok(python) = detect_interpreter() else {
        result.missing_tools.push("python".to_string());
        result.tools_verified.insert("python".to_string(), false);
        return;
    };
    result.tools_verified.insert("python".to_string(), true);
    let actual = probe_version(&python, context);
    record_version(
        "python",
        &snapshot.python_version,
        actual.as_deref(),
        mode,
        result,
        incompatible,
    );
}

/// A tool check outcome, produced by the worker pool and folded into the
/// result sequentially to keep output ordering deterministic.
struct ToolOutcome {
    tool: String,
    expected: String,
    resolved: bool,
    actual: Option<String>,
}

fn check_tools(
    snapshot: &EnvironmentSnapshot,
    mode: VersionMode,
    context: &ProcessContext,
    result: &mut ReproductionResult,
    incompatible: &mut BTreeSet<String>,
) {
    let tools: Vec<(String, String)> = snapshot
        .tool_versions
        .iter()
        .filter(|(tool, _)| !matches!(tool.as_str(), "python" | "python3"))
        .map(|(tool, version)| (tool.clone(), version.clone()))
        .collect();

    let outcomes: Mutex<Vec<Option<ToolOutcome>>> =
        Mutex::new((0..tools.len()).map(|_| None).collect());
    let next = std::sync::atomic::AtomicUsize::new(0);
    let workers = TOOL_CHECK_WORKERS.clamp(1, tools.len().max(1));
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                let Some((tool, expected)) = tools.get(index) else {
                    return;
                };
                let outcome = match which::which(tool) {
                    Ok(_) => ToolOutcome {
                        tool: tool.clone(),
                        expected: expected.clone(),
                        resolved: true,
                        actual: probe_version(tool, context),
                    },
                    Err(_) => ToolOutcome {
                        tool: tool.clone(),
                        expected: expected.clone(),
                        resolved: false,
                        actual: None,
                    },
                };
                outcomes.lock().expect("tool outcomes lock")[index] = Some(outcome);
            });
        }
    });

    let outcomes = outcomes.into_inner().expect("tool outcomes lock");
    for outcome in outcomes.into_iter().flatten() {
        if !outcome.resolved {
            result.tools_verified.insert(outcome.tool.clone(), false);
            result.missing_tools.push(outcome.tool);
            continue;
        }
        result.tools_verified.insert(outcome.tool.clone(), true);
        record_version(
            &outcome.tool,
            &outcome.expected,
            outcome.actual.as_deref(),
            mode,
            result,
            incompatible,
        );
    }
}

fn record_version(
    tool: &str,
    expected: &str,
    actual: Option<&str>,
    mode: VersionMode,
    result: &mut ReproductionResult,
    incompatible: &mut BTreeSet<String>,
) {
    let Some(actual) = actual else {
        result.versions_verified.insert(tool.to_string(), false);
        result.warnings.push(format!(
            "could not determine the installed version of {tool} (expected {expected})"
        ));
        return;
    };
    match compare_versions(expected, actual, classify_tool(tool), mode) {
        Compatibility::Exact => {
            result.versions_verified.insert(tool.to_string(), true);
        }
        Compatibility::Compatible => {
            result.versions_verified.insert(tool.to_string(), false);
            result
                .version_mismatches
                .insert(tool.to_string(), (expected.to_string(), actual.to_string()));
            result.warnings.push(format!(
                "{tool} version differs ({expected} -> {actual}) but is compatible"
            ));
        }
        Compatibility::Incompatible => {
            result.versions_verified.insert(tool.to_string(), false);
            result
                .version_mismatches
                .insert(tool.to_string(), (expected.to_string(), actual.to_string()));
            incompatible.insert(tool.to_string());
        }
    }
}

fn probe_version(tool: &str, context: &ProcessContext) -> Option<String> {
    for flag in ["--version", "version"] {
        let request = RunRequest::new([tool, flag])
            .timeout(VERSION_PROBE_TIMEOUT)
            .merge_stderr();
        if let Ok(output) = run(&request, context) {
            if let Some(version) = extract_version(&output.stdout) {
                return Some(version);
            }
        }
    }
    None
}

/// Writes every captured lock and config file into the target directory.
/// The snapshot content is authoritative; a checksum that no longer matches
/// the captured text is reported as a warning, never as a failure.
fn restore_project(
    snapshot: &EnvironmentSnapshot,
    target: &Path,
    result: &mut ReproductionResult,
) {
    let files = snapshot
        .lock_files
        .iter()
        .chain(snapshot.config_files.iter());
    for (name, content) in files {
        let path = target.join(name);
        match write_atomic(&path, content) {
            Ok(()) => {
                let recomputed = denv_domain::sha256_hex(content);
                match snapshot.checksums.get(name) {
                    Some(expected) if *expected == recomputed => {
                        result.actions_completed.push(format!("Restored {name}"));
                    }
                    Some(_) => {
                        result.actions_completed.push(format!("Restored {name}"));
                        result
                            .warnings
                            .push(format!("Checksum mismatch for {name}"));
                    }
                    None => {
                        result.actions_completed.push(format!("Restored {name}"));
                        result
                            .warnings
                            .push(format!("No captured checksum for {name}"));
                    }
                }
            }
            Err(error) => {
                result
                    .actions_failed
                    .push(format!("could not restore {name}: {error}"));
            }
        }
    }
}

fn verify_configs(snapshot: &EnvironmentSnapshot, target: &Path, result: &mut ReproductionResult) {
    for (name, expected) in &snapshot.config_files {
        let path = target.join(name);
        match std::fs::read_to_string(&path) {
            Ok(actual) if actual == *expected => {
                result.configs_verified.insert(name.clone(), true);
            }
            Ok(_) => {
                result.configs_verified.insert(name.clone(), false);
                result
                    .config_differences
                    .insert(name.clone(), "Content differs".to_string());
            }
            Err(_) => {
                result.configs_verified.insert(name.clone(), false);
                result
                    .config_differences
                    .insert(name.clone(), "File missing".to_string());
            }
        }
    }
}

/// Drives the project's package manager to synchronize dependencies from
/// the restored lock file. Failures accumulate; they never unwind.
fn auto_install(
    snapshot: &EnvironmentSnapshot,
    target: &Path,
    context: &ProcessContext,
    result: &mut ReproductionResult,
) {
    let request = if snapshot.lock_files.contains_key("uv.lock") && which::which("uv").is_ok() {
        Some(("uv sync", RunRequest::new(["uv", "sync"])))
    } else if snapshot.lock_files.contains_key("requirements.txt") {
        detect_interpreter().ok().map(|python| {
            (
                "pip install -r requirements.txt",
                RunRequest::new([
                    python.as_str(),
                    "-m",
                    "pip",
                    "install",
                    "-r",
                    "requirements.txt",
                ]),
            )
        })
    } else {
        None
    };
    let Some((label, request)) = request else {
        result
            .warnings
            .push("auto-install requested but no usable lock file was captured".to_string());
        return;
    };
    debug!(label, "running dependency install");
    let request = request
        .cwd(target)
        .timeout(Duration::from_secs(600))
        .new_process_group();
    match run(&request, context) {
        Ok(_) => result.actions_completed.push(format!("Ran {label}")),
        Err(error) => result
            .actions_failed
            .push(format!("{label} failed: {error}")),
    }
}
