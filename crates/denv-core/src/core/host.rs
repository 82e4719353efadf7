//! Base host report.
//!
//! The `system` section of a diagnostic report: platform, architecture,
//! hostname and the active Python, plus optional CPU/memory/disk metrics
//! behind the `host-metrics` feature.

use std::time::Duration;

use denv_domain::{extract_version, Platform};
use serde_json::{json, Map, Value};

use crate::core::process::{run, ProcessContext, RunRequest};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Collects the base system facts. Total: anything unavailable is simply
/// omitted from the map.
pub fn collect_system_info(context: &ProcessContext) -> Map<String, Value> {
    let platform = Platform::current();
    let mut info = Map::new();
    info.insert("platform".into(), json!(platform.as_str()));
    info.insert("architecture".into(), json!(std::env::consts::ARCH));
    if let Some(hostname) = hostname() {
        info.insert("hostname".into(), json!(hostname));
    }
    if let Some(release) = os_release(context) {
        info.insert("platform_release".into(), json!(release));
    }
    if let Some(python) = python_version(context) {
        info.insert("python_version".into(), json!(python));
    }
    #[cfg(feature = "host-metrics")]
    extend_with_metrics(&mut info);
    info
}

fn python_version(context: &ProcessContext) -> Option<String> {
    for candidate in ["python3", "python"] {
        let request = RunRequest::new([candidate, "--version"]).timeout(PROBE_TIMEOUT);
        if let Ok(output) = run(&request, context) {
            let text = if output.stdout.trim().is_empty() {
                output.stderr
            } else {
                output.stdout
            };
            if let Some(version) = extract_version(&text) {
                return Some(version);
            }
        }
    }
    None
}

fn os_release(context: &ProcessContext) -> Option<String> {
    if cfg!(windows) {
        return None;
    }
    let request = RunRequest::new(["uname", "-r"]).timeout(PROBE_TIMEOUT);
    run(&request, context)
        .ok()
        .map(|output| output.stdout.trim().to_string())
        .filter(|release| !release.is_empty())
}

#[cfg(unix)]
fn hostname() -> Option<String> {
    let mut buffer = [0u8; 256];
    let result = unsafe { libc::gethostname(buffer.as_mut_ptr().cast(), buffer.len()) };
    if result != 0 {
        return None;
    }
    let end = buffer.iter().position(|&byte| byte == 0)?;
    String::from_utf8(buffer[..end].to_vec()).ok()
}

#[cfg(not(unix))]
fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}

#[cfg(feature = "host-metrics")]
fn extend_with_metrics(info: &mut Map<String, Value>) {
    let mut cpu = Map::new();
    cpu.insert("logical_cores".into(), json!(num_cpus::get()));
    cpu.insert("physical_cores".into(), json!(num_cpus::get_physical()));
    info.insert("cpu".into(), Value::Object(cpu));

    #[cfg(unix)]
    {
        if let Some(memory) = memory_info() {
            info.insert("memory".into(), memory);
        }
        if let Some(disk) = disk_info() {
            info.insert("disk".into(), disk);
        }
    }
}

#[cfg(all(feature = "host-metrics", unix))]
fn memory_info() -> Option<Value> {
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if pages <= 0 || page_size <= 0 {
        return None;
    }
    #[allow(clippy::cast_sign_loss)]
    let total_mb = (pages as u64).saturating_mul(page_size as u64) / (1024 * 1024);
    Some(json!({ "total_mb": total_mb }))
}

#[cfg(all(feature = "host-metrics", unix))]
fn disk_info() -> Option<Value> {
    use std::ffi::CString;
    let root = CString::new("/").ok()?;
    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::statvfs(root.as_ptr(), &mut stats) };
    if result != 0 {
        return None;
    }
    #[allow(clippy::unnecessary_cast)]
    let block = stats.f_frsize as u64;
    #[allow(clippy::unnecessary_cast)]
    let blocks = stats.f_blocks as u64;
    #[allow(clippy::unnecessary_cast)]
    let available = stats.f_bavail as u64;
    let total_gb = blocks.saturating_mul(block) / (1024 * 1024 * 1024);
    let free_gb = available.saturating_mul(block) / (1024 * 1024 * 1024);
    Some(json!({ "total_gb": total_gb, "free_gb": free_gb }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_report_has_platform_and_architecture() {
        let context = ProcessContext::new();
        let info = collect_system_info(&context);
        assert_eq!(
            info["platform"],
            json!(Platform::current().as_str())
        );
        assert!(info.contains_key("architecture"));
    }

    #[cfg(unix)]
    #[test]
    fn hostname_resolves_on_unix() {
        assert!(hostname().is_some());
    }

    #[cfg(feature = "host-metrics")]
    #[test]
    fn metrics_include_cpu_counts() {
        let context = ProcessContext::new();
        let info = collect_system_info(&context);
        let cores = info["cpu"]["logical_cores"].as_u64().unwrap();
        assert!(cores >= 1);
    }
}
