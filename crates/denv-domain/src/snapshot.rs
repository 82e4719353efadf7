//! Environment snapshot data model.
//!
//! A snapshot is a single self-contained, checksummed description of an
//! environment: host facts, tool inventory, selected environment variables
//! and the project's lock/config files as full text. It is persistable
//! (JSON or YAML) and reloaded verbatim; the schema is versioned.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current snapshot schema version. Always serialized; snapshots without a
/// known version are rejected at load time.
pub const SCHEMA_VERSION: u32 = 1;

/// Lowercase hex sha256 of a text, as stored in `checksums`.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub schema_version: u32,
    pub snapshot_id: String,
    /// ISO-8601 UTC.
    pub timestamp: String,
    /// Version of the snapshotter that produced this file.
    pub tool_version: String,

    pub platform: String,
    pub architecture: String,
    pub python_version: String,
    pub python_executable: String,

    #[serde(default)]
    pub python_packages: IndexMap<String, String>,
    #[serde(default)]
    pub system_packages: IndexMap<String, String>,
    #[serde(default)]
    pub tool_versions: IndexMap<String, String>,
    #[serde(default)]
    pub tool_paths: IndexMap<String, String>,

    #[serde(default)]
    pub environment_variables: IndexMap<String, String>,
    #[serde(default)]
    pub path_entries: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub lock_files: IndexMap<String, String>,
    #[serde(default)]
    pub config_files: IndexMap<String, String>,
    /// File name to lowercase hex sha256 of the captured text.
    #[serde(default)]
    pub checksums: IndexMap<String, String>,

    #[serde(default)]
    pub reproduction_steps: Vec<String>,
    #[serde(default)]
    pub platform_notes: Vec<String>,
}

impl EnvironmentSnapshot {
    /// Fresh snapshot shell at the current schema version; inventories and
    /// project sections start empty.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot_id: impl Into<String>,
        timestamp: impl Into<String>,
        tool_version: impl Into<String>,
        platform: impl Into<String>,
        architecture: impl Into<String>,
        python_version: impl Into<String>,
        python_executable: impl Into<String>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            snapshot_id: snapshot_id.into(),
            timestamp: timestamp.into(),
            tool_version: tool_version.into(),
            platform: platform.into(),
            architecture: architecture.into(),
            python_version: python_version.into(),
            python_executable: python_executable.into(),
            python_packages: IndexMap::new(),
            system_packages: IndexMap::new(),
            tool_versions: IndexMap::new(),
            tool_paths: IndexMap::new(),
            environment_variables: IndexMap::new(),
            path_entries: Vec::new(),
            project_path: None,
            project_type: None,
            lock_files: IndexMap::new(),
            config_files: IndexMap::new(),
            checksums: IndexMap::new(),
            reproduction_steps: Vec::new(),
            platform_notes: Vec::new(),
        }
    }

    /// Records a captured project file and its checksum in one step.
    pub fn add_lock_file(&mut self, name: &str, content: String) {
        self.checksums
            .insert(name.to_string(), sha256_hex(&content));
        self.lock_files.insert(name.to_string(), content);
    }

    pub fn add_config_file(&mut self, name: &str, content: String) {
        self.checksums
            .insert(name.to_string(), sha256_hex(&content));
        self.config_files.insert(name.to_string(), content);
    }
}

/// Outcome of verifying or rebuilding an environment from a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReproductionResult {
    pub snapshot_id: String,
    pub platform: String,
    pub success: bool,

    #[serde(default)]
    pub tools_verified: IndexMap<String, bool>,
    /// Exact-equality verdict per tool. A lenient-compatible drift records
    /// `false` here together with the mismatch pair and a warning, without
    /// failing the aggregate.
    #[serde(default)]
    pub versions_verified: IndexMap<String, bool>,
    #[serde(default)]
    pub version_mismatches: IndexMap<String, (String, String)>,
    #[serde(default)]
    pub missing_tools: Vec<String>,

    #[serde(default)]
    pub configs_verified: IndexMap<String, bool>,
    #[serde(default)]
    pub config_differences: IndexMap<String, String>,

    #[serde(default)]
    pub actions_completed: Vec<String>,
    #[serde(default)]
    pub actions_failed: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ReproductionResult {
    pub fn new(snapshot_id: &str, platform: &str) -> Self {
        Self {
            snapshot_id: snapshot_id.to_string(),
            platform: platform.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> EnvironmentSnapshot {
        let mut snapshot = EnvironmentSnapshot::new(
            "denv_lin_20240115_103000_abc12345",
            "2024-01-15T10:30:00Z",
            "0.1.0",
            "linux",
            "x86_64",
            "3.11.5",
            "/usr/bin/python3",
        );
        snapshot.path_entries = vec!["/usr/bin".into()];
        snapshot.project_path = Some("/path/to/project".into());
        snapshot.project_type = Some("django".into());
        snapshot.reproduction_steps = vec!["Install Python 3.11.5".into()];
        snapshot
            .tool_versions
            .insert("git".into(), "2.39.3".into());
        snapshot.add_lock_file("uv.lock", "version = 1\n".into());
        snapshot.add_config_file("pyproject.toml", "[project]\nname = \"x\"\n".into());
        snapshot
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        let digest = sha256_hex("hello");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, digest.to_lowercase());
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn captured_files_get_checksums() {
        let snapshot = sample_snapshot();
        assert_eq!(
            snapshot.checksums["uv.lock"],
            sha256_hex(&snapshot.lock_files["uv.lock"])
        );
        assert_eq!(
            snapshot.checksums["pyproject.toml"],
            sha256_hex(&snapshot.config_files["pyproject.toml"])
        );
    }

    #[test]
    fn json_round_trip_preserves_every_field() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        let back: EnvironmentSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.schema_version, snapshot.schema_version);
        assert_eq!(back.snapshot_id, snapshot.snapshot_id);
        assert_eq!(back.tool_versions, snapshot.tool_versions);
        assert_eq!(back.lock_files, snapshot.lock_files);
        assert_eq!(back.checksums, snapshot.checksums);
        assert_eq!(back.project_type, snapshot.project_type);
    }

    #[cfg(feature = "yaml")]
    #[test]
    fn yaml_round_trip_preserves_every_field() {
        let snapshot = sample_snapshot();
        let yaml = serde_yaml::to_string(&snapshot).unwrap();
        let back: EnvironmentSnapshot = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.snapshot_id, snapshot.snapshot_id);
        assert_eq!(back.lock_files, snapshot.lock_files);
        assert_eq!(back.checksums, snapshot.checksums);
    }

    #[test]
    fn schema_version_is_always_serialized() {
        let snapshot = sample_snapshot();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["schema_version"], serde_json::json!(SCHEMA_VERSION));
    }
}
