//! Public entry points: diagnose, classify, snapshot, reproduce.
//!
//! Everything a frontend needs; the CLI crate is a thin dispatcher over
//! these functions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use denv_domain::{
    all_categories, builtin_registry, classify_evidence, EnvironmentSnapshot, ProjectAnalysis,
    ReproductionResult,
};
use serde_json::{json, Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::core::evidence::collect_evidence;
use crate::core::host::collect_system_info;
use crate::core::probe::{run_probes, ProbeOptions};
use crate::core::process::ProcessContext;
use crate::core::reproduce::{reproduce, ReproduceOptions};
use crate::core::snapshot::{
    capture_snapshot, load_snapshot, save_snapshot, CaptureOptions, SnapshotFormat,
};

#[derive(Debug, Clone, Default)]
pub struct DiagnoseOptions {
    pub categories: Vec<String>,
    pub tools: Vec<String>,
    pub include_system_info: bool,
    pub probe: ProbeOptions,
}

impl DiagnoseOptions {
    pub fn new() -> Self {
        Self {
            include_system_info: true,
            ..Self::default()
        }
    }
}

/// Runs the full diagnostic sweep and renders the report document:
/// `system`, `tools.*` and `_metadata`, every fact addressable by a dotted
/// path. Engine tunables come from `DENV_*` variables unless the caller
/// set them explicitly.
pub fn diagnose(options: &DiagnoseOptions) -> Value {
    let context = ProcessContext::new();
    let config = crate::core::config::Config::from_env();
    let defaults = ProbeOptions::default();
    let mut probe_options = ProbeOptions {
        categories: options.categories.clone(),
        tools: options.tools.clone(),
        ..options.probe.clone()
    };
    if probe_options.worker_count == defaults.worker_count {
        probe_options.worker_count = config.worker_count;
    }
    if probe_options.command_timeout == defaults.command_timeout {
        probe_options.command_timeout = config.command_timeout;
    }
    if probe_options.engine_timeout == defaults.engine_timeout {
        probe_options.engine_timeout = config.engine_timeout;
    }
    let run = run_probes(&probe_options, &context);

    let mut document = Map::new();
    if options.include_system_info {
        document.insert(
            "system".to_string(),
            Value::Object(collect_system_info(&context)),
        );
    }
    for (key, value) in run.tree.as_map() {
        document.insert(key.clone(), value.clone());
    }

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    let filter = |values: &[String]| -> Value {
        if values.is_empty() {
            json!("all")
        } else {
            json!(values)
        }
    };
    let mut metadata = Map::new();
    metadata.insert("generated_at".to_string(), json!(generated_at));
    metadata.insert("generator".to_string(), json!("denv-diagnose"));
    metadata.insert(
        "filters".to_string(),
        json!({
            "categories": filter(&options.categories),
            "tools": filter(&options.tools),
            "include_system_info": options.include_system_info,
        }),
    );
    if !run.warnings.is_empty() {
        metadata.insert("warnings".to_string(), json!(run.warnings));
    }
    document.insert("_metadata".to_string(), Value::Object(metadata));
    Value::Object(document)
}

/// Flattened category list for `--list-categories`.
pub fn list_categories() -> Vec<&'static str> {
    all_categories()
}

/// `(tool, category)` pairs for `--list-tools`, in registry order.
pub fn list_tools() -> Vec<(String, String)> {
    builtin_registry()
        .iter()
        .map(|spec| (spec.name.clone(), spec.category.clone()))
        .collect()
}

/// Classifies the project at `path`.
///
/// # Errors
///
/// Fails only when the path does not exist; unreadable content inside the
/// tree degrades the evidence instead of failing.
pub fn classify(path: &Path) -> Result<ProjectAnalysis> {
    let path = path
        .canonicalize()
        .with_context(|| format!("project path does not exist: {}", path.display()))?;
    let evidence = collect_evidence(&path);
    Ok(classify_evidence(&evidence))
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotRequest {
    pub project: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: SnapshotFormat,
    pub include_configs: bool,
    /// Verify the snapshot immediately by reproducing it into a scratch
    /// directory in lenient mode.
    pub verify: bool,
}

#[derive(Debug)]
pub struct SnapshotOutcome {
    pub snapshot: EnvironmentSnapshot,
    pub path: PathBuf,
    pub verification: Option<ReproductionResult>,
}

/// Captures the environment, writes the snapshot file, and optionally
/// verifies it straight away.
///
/// # Errors
///
/// Fails when capture cannot find an interpreter or the snapshot file
/// cannot be written.
pub fn snapshot(request: &SnapshotRequest) -> Result<SnapshotOutcome> {
    let context = ProcessContext::new();
    let options = CaptureOptions {
        include_configs: request.include_configs,
    };
    let snapshot = capture_snapshot(request.project.as_deref(), &options, &context)?;

    let path = match &request.output {
        Some(path) => path.clone(),
        None => {
            let extension = match request.format {
                SnapshotFormat::Json => "json",
                SnapshotFormat::Yaml => "yaml",
            };
            PathBuf::from(format!("{}.{extension}", snapshot.snapshot_id))
        }
    };
    save_snapshot(&snapshot, &path, request.format)
        .with_context(|| format!("writing snapshot to {}", path.display()))?;

    let verification = if request.verify {
        let scratch = tempfile::tempdir().context("creating verification directory")?;
        let options = ReproduceOptions {
            target: Some(scratch.path().join("verification")),
            ..ReproduceOptions::default()
        };
        Some(reproduce(&snapshot, &options, &context))
    } else {
        None
    };

    Ok(SnapshotOutcome {
        snapshot,
        path,
        verification,
    })
}

/// Loads a snapshot file and verifies or restores it on this host.
///
/// # Errors
///
/// Fatal only when the snapshot file cannot be read or fails schema
/// validation; verification findings land in the returned result.
pub fn reproduce_from_file(
    snapshot_path: &Path,
    options: &ReproduceOptions,
) -> Result<ReproductionResult> {
    let snapshot = load_snapshot(snapshot_path)
        .with_context(|| format!("loading snapshot {}", snapshot_path.display()))?;
    let context = ProcessContext::new();
    Ok(reproduce(&snapshot, options, &context))
}
