//! Environment snapshot capture.
//!
//! Queries the running interpreter, a curated subset of the tool registry,
//! an allow-listed set of environment variables and the project's lock and
//! config files, producing a self-contained [`EnvironmentSnapshot`].

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use denv_domain::{
    classify_evidence, extract_version, version_critical_tools, EnvironmentSnapshot, Platform,
};
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::core::evidence::collect_evidence;
use crate::core::process::{run, ProcessContext, RunRequest};
use crate::core::snapshot::steps;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Only these environment variables are ever captured; arbitrary user
/// variables stay out of snapshots.
const ENV_ALLOWLIST: &[&str] = &[
    "PATH",
    "PYTHONPATH",
    "VIRTUAL_ENV",
    "CONDA_PREFIX",
    "CONDA_DEFAULT_ENV",
    "NODE_PATH",
    "GOPATH",
    "GOROOT",
    "CARGO_HOME",
    "RUSTUP_HOME",
    "JAVA_HOME",
    "UV_PYTHON",
    "UV_CACHE_DIR",
];

const LOCK_FILE_NAMES: &[&str] = &[
    "uv.lock",
    "poetry.lock",
    "Pipfile.lock",
    "requirements.txt",
    "requirements-dev.txt",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "go.sum",
    "Gemfile.lock",
];

const CONFIG_FILE_NAMES: &[&str] = &[
    "pyproject.toml",
    "setup.cfg",
    "tox.ini",
    "pytest.ini",
    "ruff.toml",
    ".flake8",
    "mypy.ini",
    ".pre-commit-config.yaml",
    ".python-version",
    "package.json",
    "Cargo.toml",
    "go.mod",
];

/// System-level plumbing tools recorded under `system_packages`.
const SYSTEM_TOOLS: &[&str] = &["curl", "make", "tar", "openssl", "jq"];

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Capture project config files in addition to lock files.
    pub include_configs: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_configs: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PipListEntry {
    name: String,
    version: String,
}

/// Captures a complete snapshot of the current environment.
///
/// # Errors
///
/// Fails when no Python interpreter can be found (set `DENV_PYTHON` to
/// override discovery) or when the interpreter cannot report its version.
pub fn capture_snapshot(
    project: Option<&Path>,
    options: &CaptureOptions,
    context: &ProcessContext,
) -> Result<EnvironmentSnapshot> {
    let platform = Platform::current();
    let timestamp = OffsetDateTime::now_utc();
    let python_executable = detect_interpreter()?;
    let python_version = interpreter_version(&python_executable, context)?;

    let mut snapshot = EnvironmentSnapshot::new(
        generate_snapshot_id(&platform, timestamp),
        timestamp
            .format(&Rfc3339)
            .context("formatting snapshot timestamp")?,
        env!("CARGO_PKG_VERSION"),
        platform.as_str(),
        std::env::consts::ARCH,
        python_version,
        python_executable.clone(),
    );

    capture_python_packages(&mut snapshot, &python_executable, context);
    capture_tools(&mut snapshot, context);
    capture_environment(&mut snapshot);

    if let Some(project) = project {
        if project.exists() {
            capture_project(&mut snapshot, project, options.include_configs);
        } else {
            warn!(path = %project.display(), "project path does not exist; skipping project capture");
        }
    }

    steps::generate(&mut snapshot);
    debug!(id = %snapshot.snapshot_id, "environment snapshot captured");
    Ok(snapshot)
}

/// Discovers the Python interpreter the snapshot describes.
///
/// # Errors
///
/// Returns an error when no interpreter is on PATH and `DENV_PYTHON` is
/// unset.
pub fn detect_interpreter() -> Result<String> {
    if let Some(explicit) = crate::core::config::Config::from_env().python_override {
        return Ok(explicit);
    }
    for candidate in ["python3", "python"] {
        if let Ok(path) = which::which(candidate) {
            return Ok(path.to_string_lossy().into_owned());
        }
    }
    bail!("no python interpreter found; set DENV_PYTHON")
}

fn interpreter_version(python: &str, context: &ProcessContext) -> Result<String> {
    let request = RunRequest::new([python, "--version"])
        .timeout(PROBE_TIMEOUT)
        .merge_stderr();
    let output = run(&request, context)
        .with_context(|| format!("probing python version via {python}"))?;
    extract_version(&output.stdout)
        .with_context(|| format!("no version in python output: {}", output.stdout.trim()))
}

fn generate_snapshot_id(platform: &Platform, timestamp: OffsetDateTime) -> String {
    let stamp = format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        timestamp.year(),
        u8::from(timestamp.month()),
        timestamp.day(),
        timestamp.hour(),
        timestamp.minute(),
        timestamp.second()
    );
    let suffix: u32 = rand::random();
    format!("denv_{}_{stamp}_{suffix:08x}", platform.short_tag())
}

fn capture_python_packages(
    snapshot: &mut EnvironmentSnapshot,
    python: &str,
    context: &ProcessContext,
) {
    let request = RunRequest::new([python, "-m", "pip", "list", "--format=json"])
        .timeout(Duration::from_secs(30));
    match run(&request, context) {
        Ok(output) => match serde_json::from_str::<Vec<PipListEntry>>(&output.stdout) {
            Ok(entries) => {
                for entry in entries {
                    snapshot.python_packages.insert(entry.name, entry.version);
                }
            }
            Err(error) => warn!(%error, "pip list output was not parseable JSON"),
        },
        Err(error) => warn!(%error, "could not inventory python packages"),
    }
}

/// Queries version and path for the curated version-critical subset plus
/// the system plumbing tools.
fn capture_tools(snapshot: &mut EnvironmentSnapshot, context: &ProcessContext) {
    for tool in version_critical_tools() {
        if let Some((path, version)) = resolve_tool(tool, context) {
            snapshot.tool_paths.insert((*tool).to_string(), path);
            if let Some(version) = version {
                snapshot.tool_versions.insert((*tool).to_string(), version);
            }
        }
    }
    for tool in SYSTEM_TOOLS {
        if let Some((_, Some(version))) = resolve_tool(tool, context) {
            snapshot.system_packages.insert((*tool).to_string(), version);
        }
    }
}

/// PATH resolution plus a version probe (`--version`, then `version`).
pub fn resolve_tool(tool: &str, context: &ProcessContext) -> Option<(String, Option<String>)> {
    let path = which::which(tool).ok()?;
    let version = probe_version(tool, context);
    Some((path.to_string_lossy().into_owned(), version))
}

fn probe_version(tool: &str, context: &ProcessContext) -> Option<String> {
    for flag in ["--version", "version"] {
        let request = RunRequest::new([tool, flag])
            .timeout(PROBE_TIMEOUT)
            .merge_stderr();
        if let Ok(output) = run(&request, context) {
            if let Some(version) = extract_version(&output.stdout) {
                return Some(version);
            }
        }
    }
    None
}

fn capture_environment(snapshot: &mut EnvironmentSnapshot) {
    for key in ENV_ALLOWLIST {
        if let Ok(value) = std::env::var(key) {
            snapshot
                .environment_variables
                .insert((*key).to_string(), value);
        }
    }
    if let Some(path) = std::env::var_os("PATH") {
        snapshot.path_entries = std::env::split_paths(&path)
            .map(|entry| entry.to_string_lossy().into_owned())
            .collect();
    }
}

fn capture_project(snapshot: &mut EnvironmentSnapshot, project: &Path, include_configs: bool) {
    snapshot.project_path = Some(project.display().to_string());

    for name in LOCK_FILE_NAMES {
        if let Some(content) = read_project_file(project, name) {
            snapshot.add_lock_file(name, content);
        }
    }
    if include_configs {
        for name in CONFIG_FILE_NAMES {
            if let Some(content) = read_project_file(project, name) {
                snapshot.add_config_file(name, content);
            }
        }
    }

    let evidence = collect_evidence(project);
    let analysis = classify_evidence(&evidence);
    snapshot.project_type = Some(analysis.primary_type.to_string());
}

fn read_project_file(project: &Path, name: &str) -> Option<String> {
    let path = project.join(name);
    if !path.is_file() {
        return None;
    }
    match std::fs::read(&path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) => {
            warn!(path = %path.display(), %error, "could not read project file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_ids_embed_platform_tag_and_stay_unique() {
        let now = OffsetDateTime::now_utc();
        let id = generate_snapshot_id(&Platform::Linux, now);
        assert!(id.starts_with("denv_lin_"));
        assert_eq!(id.split('_').count(), 5);
        let other = generate_snapshot_id(&Platform::Linux, now);
        assert_ne!(id, other);
    }

    fn empty_snapshot() -> EnvironmentSnapshot {
        EnvironmentSnapshot::new(
            "denv_lin_20240115_103000_00c0ffee",
            "2024-01-15T10:30:00Z",
            "0.1.0",
            "linux",
            "x86_64",
            "3.11.5",
            "/usr/bin/python3",
        )
    }

    #[test]
    fn environment_capture_honors_the_allowlist() {
        let mut snapshot = empty_snapshot();
        capture_environment(&mut snapshot);
        for key in snapshot.environment_variables.keys() {
            assert!(ENV_ALLOWLIST.contains(&key.as_str()), "leaked {key}");
        }
        if std::env::var("PATH").is_ok() {
            assert!(!snapshot.path_entries.is_empty());
        }
    }

    #[test]
    fn project_capture_reads_locks_and_checksums() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests==2.31.0\n").unwrap();
        std::fs::write(
            dir.path().join("pyproject.toml"),
            "[project]\nname = \"x\"\n",
        )
        .unwrap();
        let mut snapshot = empty_snapshot();
        capture_project(&mut snapshot, dir.path(), true);
        assert_eq!(
            snapshot.lock_files["requirements.txt"],
            "requests==2.31.0\n"
        );
        assert!(snapshot.config_files.contains_key("pyproject.toml"));
        assert_eq!(
            snapshot.checksums["requirements.txt"],
            denv_domain::sha256_hex("requests==2.31.0\n")
        );
        assert!(snapshot.project_path.is_some());
        assert!(snapshot.project_type.is_some());
    }
}
