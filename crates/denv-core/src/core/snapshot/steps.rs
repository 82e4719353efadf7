//! Reproduction step generation.
//!
//! Turns a captured snapshot into the ordered, human-readable recipe a
//! developer (or the reproducer's auto-install mode) follows on another
//! host. Steps are keyed off the captured interpreter, the package manager
//! in use, and which lock files exist.

use denv_domain::{classify_tool, EnvironmentSnapshot, Platform, ToolClass};

/// Fills `reproduction_steps` and `platform_notes` on a snapshot.
pub fn generate(snapshot: &mut EnvironmentSnapshot) {
    let mut steps = Vec::new();
    steps.push(format!("Install Python {}", snapshot.python_version));

    if let Some(uv_version) = snapshot.tool_versions.get("uv") {
        steps.push(format!("Install uv {uv_version}"));
        steps.push(format!("uv python pin {}", snapshot.python_version));
        steps.push("uv venv".to_string());
        if snapshot.lock_files.contains_key("uv.lock") {
            steps.push("uv sync".to_string());
        } else if snapshot.lock_files.contains_key("requirements.txt") {
            steps.push("uv pip install -r requirements.txt".to_string());
        }
    } else {
        steps.push("python -m venv .venv".to_string());
        steps.push("Activate the virtual environment".to_string());
        if snapshot.lock_files.contains_key("poetry.lock")
            && snapshot.tool_versions.contains_key("poetry")
        {
            steps.push("poetry install".to_string());
        } else if snapshot.lock_files.contains_key("requirements.txt") {
            steps.push("pip install -r requirements.txt".to_string());
        }
    }

    for (tool, version) in &snapshot.tool_versions {
        if matches!(tool.as_str(), "python" | "python3" | "pip" | "pip3" | "uv") {
            continue;
        }
        if classify_tool(tool) == ToolClass::VersionCritical {
            steps.push(format!("Verify {tool} version {version}"));
        }
    }

    snapshot.reproduction_steps = steps;
    snapshot.platform_notes = platform_notes(&Platform::from_name(&snapshot.platform));
}

/// Platform-specific guidance surfaced verbatim by the reproducer when the
/// target platform differs.
pub fn platform_notes(platform: &Platform) -> Vec<String> {
    match platform {
        Platform::Macos => vec![
            "macOS: install system packages with Homebrew".to_string(),
            "macOS: ensure the Xcode Command Line Tools are installed".to_string(),
        ],
        Platform::Linux => vec![
            "Linux: install system packages with the distribution package manager (apt, dnf, pacman)"
                .to_string(),
        ],
        Platform::Windows => vec![
            "Windows: install system packages with winget or chocolatey".to_string(),
            "Windows: subprocess memory limits are not enforced".to_string(),
        ],
        Platform::Other(name) => vec![format!("{name}: no platform-specific notes")],
    }
}
