//! Parallel diagnostic probe engine.
//!
//! Executes the platform-filtered registry across a fixed-width worker
//! pool and assembles the atomic tool tree. Probe failures are recorded
//! per probe kind; one tool can never abort another.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use denv_domain::{
    commands_in_category, commands_for, parse_output, tool_path, FormatHint, Platform, ToolResult,
    ToolSpec, ToolTree,
};
use serde_json::Value;
use tracing::debug;

use crate::core::process::{run, ProcessContext, ProcessError, RunRequest};

/// Cap on captured probe output; verbose tools get cut, not hung.
const PROBE_OUTPUT_CAP: usize = 256 * 1024;
const INSTALL_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Restrict to these category prefixes (empty = all).
    pub categories: Vec<String>,
    /// Restrict to these tool names (empty = all); intersected with the
    /// category filter when both are given.
    pub tools: Vec<String>,
    pub worker_count: usize,
    pub command_timeout: Duration,
    /// Wall clock bound for the whole run; remaining probes are cancelled
    /// and the partial tree is returned with a warning.
    pub engine_timeout: Duration,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            tools: Vec::new(),
            worker_count: 10,
            command_timeout: Duration::from_secs(30),
            engine_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
pub struct ProbeRun {
    pub tree: ToolTree,
    pub warnings: Vec<String>,
    pub platform: Platform,
}

/// Selects the registry slice for this run: platform filter first, then
/// category and tool restrictions.
pub fn select_specs(platform: &Platform, options: &ProbeOptions) -> Vec<&'static ToolSpec> {
    let mut specs = commands_for(platform);
    if !options.categories.is_empty() {
        let allowed: Vec<&str> = options
            .categories
            .iter()
            .flat_map(|category| commands_in_category(category))
            .map(|spec| spec.name.as_str())
            .collect();
        specs.retain(|spec| allowed.contains(&spec.name.as_str()));
    }
    if !options.tools.is_empty() {
        specs.retain(|spec| options.tools.iter().any(|tool| *tool == spec.name));
    }
    specs
}

/// Runs the probe engine and assembles the tool tree.
pub fn run_probes(options: &ProbeOptions, context: &ProcessContext) -> ProbeRun {
    let platform = Platform::current();
    let specs = select_specs(&platform, options);
    let deadline = Instant::now() + options.engine_timeout;
    debug!(tools = specs.len(), "starting diagnostic probes");

    let results: Mutex<Vec<Option<ToolResult>>> = Mutex::new(vec![None; specs.len()]);
    let next_job = AtomicUsize::new(0);
    let done = Arc::new(AtomicBool::new(false));
    let timed_out = Arc::new(AtomicBool::new(false));

    // Watchdog: past the engine deadline, cancel the shared context so
    // in-flight children die and queued probes are skipped.
    let watchdog = {
        let done = Arc::clone(&done);
        let timed_out = Arc::clone(&timed_out);
        let context = context.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if Instant::now() >= deadline {
                    timed_out.store(true, Ordering::SeqCst);
                    context.cancel();
                    return;
                }
                thread::sleep(Duration::from_millis(100));
            }
        })
    };

    let worker_count = options.worker_count.clamp(1, specs.len().max(1));
    thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                let index = next_job.fetch_add(1, Ordering::SeqCst);
                let Some(spec) = specs.get(index) else {
                    return;
                };
                if context.is_cancelled() || Instant::now() >= deadline {
                    return;
                }
                let result = probe_tool(spec, options.command_timeout, context);
                results.lock().expect("probe results lock")[index] = Some(result);
            });
        }
    });
    done.store(true, Ordering::SeqCst);
    let _ = watchdog.join();

    let mut tree = ToolTree::new();
    let results = results.into_inner().expect("probe results lock");
    for (spec, slot) in specs.iter().zip(results) {
        if let Some(result) = slot {
            tree.insert(&tool_path(&spec.category, &spec.name), result.into_value());
        }
    }

    let mut warnings = Vec::new();
    if timed_out.load(Ordering::SeqCst) {
        warnings.push(format!(
            "diagnostic run exceeded {}s; returning partial results",
            options.engine_timeout.as_secs()
        ));
    }
    ProbeRun {
        tree,
        warnings,
        platform,
    }
}

/// Probes a single tool: installation check first, then every registered
/// probe command. Individual probe failures land in `errors` and never
/// abort the sibling probes.
pub fn probe_tool(
    spec: &ToolSpec,
    command_timeout: Duration,
    context: &ProcessContext,
) -> ToolResult {
    let mut result = ToolResult {
        installed: false,
        category: spec.category.clone(),
        ..ToolResult::default()
    };

    match which::which(&spec.name) {
        Ok(path) => {
            result.installed = true;
            result
                .fields
                .insert("path".into(), Value::String(path.to_string_lossy().into_owned()));
        }
        Err(_) => {
            result.installed = probe_runs(&spec.name, "--version", context)
                || probe_runs(&spec.name, "version", context);
            if !result.installed {
                return result;
            }
        }
    }

    for (kind, template) in &spec.commands {
        if context.is_cancelled() {
            result.errors.insert(kind.clone(), "interrupted".into());
            break;
        }
        let argv: Vec<&str> = template.split_whitespace().collect();
        if argv.is_empty() {
            continue;
        }
        let request = RunRequest::new(argv)
            .timeout(command_timeout)
            .max_output_size(PROBE_OUTPUT_CAP)
            .merge_stderr();
        match run(&request, context) {
            Ok(output) => record_probe(&mut result, kind, &output.stdout, spec.format_hint),
            Err(ProcessError::Interrupted) => {
                result.errors.insert(kind.clone(), "interrupted".into());
                break;
            }
            Err(error) => {
                result.errors.insert(kind.clone(), describe_error(&error));
            }
        }
    }
    result
}

fn probe_runs(tool: &str, flag: &str, context: &ProcessContext) -> bool {
    let request = RunRequest::new([tool, flag]).timeout(INSTALL_CHECK_TIMEOUT);
    run(&request, context).is_ok()
}

fn record_probe(result: &mut ToolResult, kind: &str, stdout: &str, hint: FormatHint) {
    let parsed = parse_output(stdout, hint);
    if kind == "version" {
        let version = parsed
            .fields
            .get("version")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .or_else(|| denv_domain::extract_version(stdout));
        match version {
            Some(version) => {
                result
                    .fields
                    .insert("version".into(), Value::String(version));
            }
            None => {
                let fields = parsed.into_fields();
                if !fields.is_empty() {
                    let map: serde_json::Map<String, Value> = fields.into_iter().collect();
                    result.fields.insert("version".into(), Value::Object(map));
                }
            }
        }
        return;
    }
    let fields = parsed.into_fields();
    if !fields.is_empty() {
        let map: serde_json::Map<String, Value> = fields.into_iter().collect();
        result.fields.insert(kind.to_string(), Value::Object(map));
    }
}

fn describe_error(error: &ProcessError) -> String {
    match error {
        ProcessError::Execution {
            exit_code, stderr, ..
        } => {
            let stderr = stderr.trim();
            if stderr.is_empty() {
                format!("command failed with exit code {exit_code}")
            } else {
                stderr.to_string()
            }
        }
        other => other.to_string(),
    }
}
