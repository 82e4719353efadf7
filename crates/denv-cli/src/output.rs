use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
#[cfg(not(feature = "yaml"))]
use tracing::warn;

use crate::cli::FormatCli;

/// Renders a value in the requested format. A YAML request without the
/// YAML backend falls back to JSON with a warning.
pub fn render<T: Serialize>(value: &T, format: FormatCli) -> Result<String> {
    match format {
        FormatCli::Json => {
            serde_json::to_string_pretty(value).context("serializing output as JSON")
        }
        FormatCli::Yaml => render_yaml(value),
    }
}

#[cfg(feature = "yaml")]
fn render_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value).context("serializing output as YAML")
}

#[cfg(not(feature = "yaml"))]
fn render_yaml<T: Serialize>(value: &T) -> Result<String> {
    warn!("YAML support was not built in; falling back to JSON");
    serde_json::to_string_pretty(value).context("serializing output as JSON")
}

/// Writes to the output file or stdout. Returns the process exit code:
/// file write failures map to exit code 1.
pub fn emit(text: &str, output: Option<&Path>) -> i32 {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                if let Err(error) = std::fs::create_dir_all(parent) {
                    eprintln!("error: could not create {}: {error}", parent.display());
                    return 1;
                }
            }
            match std::fs::write(path, text) {
                Ok(()) => {
                    eprintln!("Report saved to: {}", path.display());
                    0
                }
                Err(error) => {
                    eprintln!("error: could not write {}: {error}", path.display());
                    1
                }
            }
        }
        None => {
            println!("{text}");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_rendering_is_pretty() {
        let text = render(&json!({"a": 1}), FormatCli::Json).unwrap();
        assert!(text.contains("\"a\": 1"));
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_rendering_works_when_built_in() {
        let text = render(&json!({"a": 1}), FormatCli::Yaml).unwrap();
        assert!(text.contains("a: 1"));
    }

    #[test]
    fn emit_to_unwritable_path_returns_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::create_dir_all(&path).unwrap();
        // Writing over a directory fails.
        assert_eq!(emit("{}", Some(&path)), 1);
    }

    #[test]
    fn emit_to_file_returns_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        assert_eq!(emit("{}", Some(&path)), 0);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }
}
