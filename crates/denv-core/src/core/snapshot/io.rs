//! Snapshot persistence.
//!
//! Snapshots are single self-contained files, JSON by default and YAML when
//! the optional backend is built in. Writes are atomic (temp file in the
//! target directory, fsync, rename); loads validate the schema version
//! before anything else looks at the data.

use std::io::Write;
use std::path::{Path, PathBuf};

use denv_domain::{EnvironmentSnapshot, SCHEMA_VERSION};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot could not be serialized: {0}")]
    Serialize(String),
    #[error("snapshot schema invalid: {0}")]
    Schema(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    #[default]
    Json,
    Yaml,
}

impl SnapshotFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// Whether the optional YAML backend was compiled in.
pub fn yaml_supported() -> bool {
    cfg!(feature = "yaml")
}

/// Serializes and atomically writes a snapshot.
///
/// # Errors
///
/// Fails on serialization problems, on a YAML request without the YAML
/// backend, or on filesystem errors.
pub fn save_snapshot(
    snapshot: &EnvironmentSnapshot,
    path: &Path,
    format: SnapshotFormat,
) -> Result<PathBuf, SnapshotError> {
    let text = match format {
        SnapshotFormat::Json => serde_json::to_string_pretty(snapshot)
            .map_err(|error| SnapshotError::Serialize(error.to_string()))?,
        SnapshotFormat::Yaml => serialize_yaml(snapshot)?,
    };
    write_atomic(path, &text)?;
    debug!(path = %path.display(), "snapshot saved");
    Ok(path.to_path_buf())
}

#[cfg(feature = "yaml")]
fn serialize_yaml(snapshot: &EnvironmentSnapshot) -> Result<String, SnapshotError> {
    serde_yaml::to_string(snapshot).map_err(|error| SnapshotError::Serialize(error.to_string()))
}

#[cfg(not(feature = "yaml"))]
fn serialize_yaml(_snapshot: &EnvironmentSnapshot) -> Result<String, SnapshotError> {
    Err(SnapshotError::Serialize(
        "YAML support was not built in; use JSON".to_string(),
    ))
}

/// Atomic write: temp file beside the target, fsync, rename.
pub fn write_atomic(path: &Path, text: &str) -> Result<(), SnapshotError> {
    let parent = path.parent().filter(|parent| !parent.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }
    let directory = parent.unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(directory)?;
    temp.write_all(text.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Loads and validates a snapshot file.
///
/// # Errors
///
/// [`SnapshotError::Schema`] when the file cannot be parsed, carries no
/// `schema_version`, or carries an unknown one. This is the only fatal
/// error of the reproduction path.
pub fn load_snapshot(path: &Path) -> Result<EnvironmentSnapshot, SnapshotError> {
    let text = std::fs::read_to_string(path)?;
    let value = parse_value(&text, SnapshotFormat::from_path(path))?;
    let version = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| SnapshotError::Schema("missing schema_version".to_string()))?;
    if version != u64::from(SCHEMA_VERSION) {
        return Err(SnapshotError::Schema(format!(
            "unsupported schema_version {version}, expected {SCHEMA_VERSION}"
        )));
    }
    serde_json::from_value(value).map_err(|error| SnapshotError::Schema(error.to_string()))
}

fn parse_value(text: &str, format: SnapshotFormat) -> Result<serde_json::Value, SnapshotError> {
    match format {
        SnapshotFormat::Json => serde_json::from_str(text)
            .map_err(|error| SnapshotError::Schema(format!("invalid JSON: {error}"))),
        SnapshotFormat::Yaml => parse_yaml_value(text),
    }
}

#[cfg(feature = "yaml")]
fn parse_yaml_value(text: &str) -> Result<serde_json::Value, SnapshotError> {
    serde_yaml::from_str(text)
        .map_err(|error| SnapshotError::Schema(format!("invalid YAML: {error}")))
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml_value(_text: &str) -> Result<serde_json::Value, SnapshotError> {
    Err(SnapshotError::Schema(
        "YAML support was not built in".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use denv_domain::sha256_hex;

    fn sample() -> EnvironmentSnapshot {
        let mut snapshot = EnvironmentSnapshot::new(
            "denv_lin_20240115_103000_00c0ffee",
            "2024-01-15T10:30:00Z",
            "0.1.0",
            "linux",
            "x86_64",
            "3.11.5",
            "/usr/bin/python3",
        );
        snapshot.add_lock_file("requirements.txt", "requests==2.31.0\n".into());
        snapshot
    }

    #[test]
    fn json_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let snapshot = sample();
        save_snapshot(&snapshot, &path, SnapshotFormat::Json).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.snapshot_id, snapshot.snapshot_id);
        assert_eq!(loaded.lock_files, snapshot.lock_files);
        assert_eq!(
            loaded.checksums["requirements.txt"],
            sha256_hex("requests==2.31.0\n")
        );
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.yaml");
        let snapshot = sample();
        save_snapshot(&snapshot, &path, SnapshotFormat::Yaml).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded.snapshot_id, snapshot.snapshot_id);
        assert_eq!(loaded.lock_files, snapshot.lock_files);
    }

    #[test]
    fn missing_schema_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"snapshot_id": "x"}"#).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(SnapshotError::Schema(_))
        ));
    }

    #[test]
    fn unknown_schema_version_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        let mut snapshot = sample();
        snapshot.schema_version = 999;
        let text = serde_json::to_string(&snapshot).unwrap();
        std::fs::write(&path, text).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(SnapshotError::Schema(_))
        ));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a/b/snap.yaml")),
            SnapshotFormat::Yaml
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a/b/snap.yml")),
            SnapshotFormat::Yaml
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a/b/snap.json")),
            SnapshotFormat::Json
        );
        assert_eq!(
            SnapshotFormat::from_path(Path::new("a/b/snap")),
            SnapshotFormat::Json
        );
    }
}
