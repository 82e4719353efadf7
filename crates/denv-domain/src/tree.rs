//! Atomic information tree.
//!
//! Every fact collected by the probe engine lives at a unique dotted path
//! (`tools.version_control.git.version`). The tree is an insertion-ordered
//! JSON object so that rendering is deterministic within a run.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Runtime outcome for a single tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    pub installed: bool,
    pub category: String,
    /// Probe kind to parsed value; a flattened `version` string when the
    /// version probe produced one.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub fields: IndexMap<String, Value>,
    /// Probe kind to error message for probes that failed.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub errors: IndexMap<String, String>,
}

impl ToolResult {
    pub fn not_installed(category: &str) -> Self {
        Self {
            installed: false,
            category: category.to_string(),
            ..Self::default()
        }
    }

    /// Renders the result as the JSON object stored at the tool's tree
    /// path. The category is omitted because it is encoded in the path.
    pub fn into_value(self) -> Value {
        let mut map = Map::new();
        map.insert("installed".to_string(), Value::Bool(self.installed));
        for (kind, value) in self.fields {
            map.insert(kind, value);
        }
        if !self.errors.is_empty() {
            let errors: Map<String, Value> = self
                .errors
                .into_iter()
                .map(|(kind, message)| (format!("{kind}_error"), Value::String(message)))
                .collect();
            map.extend(errors);
        }
        Value::Object(map)
    }
}

/// Derives the tree path for a tool from its registry category.
///
/// Language package managers keep the language segment
/// (`tools.package_managers.language.python.pip`); system package managers
/// drop the platform segment because the tree describes exactly one host
/// (`tools.package_managers.system.brew`).
pub fn tool_path(category: &str, tool: &str) -> String {
    if let Some(language) = category.strip_prefix("package_managers.language.") {
        let language = language.split('.').next().unwrap_or("unknown");
        return format!("tools.package_managers.language.{language}.{tool}");
    }
    if category.starts_with("package_managers.system.") {
        return format!("tools.package_managers.system.{tool}");
    }
    format!("tools.{category}.{tool}")
}

/// Nested mapping addressable by dotted path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolTree(Map<String, Value>);

impl ToolTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` at the dotted `path`, creating intermediate objects.
    /// An existing leaf on the way is replaced by an object; the last
    /// writer for a full path wins.
    pub fn insert(&mut self, path: &str, value: Value) {
        let mut segments = path.split('.').peekable();
        let mut current = &mut self.0;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                current.insert(segment.to_string(), value);
                return;
            }
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = entry.as_object_mut().expect("object entry");
        }
    }

    /// Looks up the value at a dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_and_get_by_dotted_path() {
        let mut tree = ToolTree::new();
        tree.insert("tools.version_control.git.version", json!("2.39.3"));
        tree.insert("tools.version_control.git.installed", json!(true));
        assert_eq!(
            tree.get("tools.version_control.git.version"),
            Some(&json!("2.39.3"))
        );
        assert_eq!(
            tree.get("tools.version_control.git"),
            Some(&json!({"version": "2.39.3", "installed": true}))
        );
        assert_eq!(tree.get("tools.missing.path"), None);
    }

    #[test]
    fn paths_never_collide() {
        let mut tree = ToolTree::new();
        tree.insert("tools.a.b", json!(1));
        tree.insert("tools.a.c", json!(2));
        assert_eq!(tree.get("tools.a.b"), Some(&json!(1)));
        assert_eq!(tree.get("tools.a.c"), Some(&json!(2)));
    }

    #[test]
    fn tool_paths_follow_category_conventions() {
        assert_eq!(
            tool_path("version_control", "git"),
            "tools.version_control.git"
        );
        assert_eq!(
            tool_path("package_managers.language.python", "pip"),
            "tools.package_managers.language.python.pip"
        );
        assert_eq!(
            tool_path("package_managers.system.macos", "brew"),
            "tools.package_managers.system.brew"
        );
    }

    #[test]
    fn tool_result_renders_errors_with_probe_suffix() {
        let mut result = ToolResult {
            installed: true,
            category: "version_control".into(),
            ..ToolResult::default()
        };
        result.fields.insert("version".into(), json!("2.39.3"));
        result
            .errors
            .insert("config_user_name".into(), "exit code 1".into());
        let value = result.into_value();
        assert_eq!(value["installed"], json!(true));
        assert_eq!(value["version"], json!("2.39.3"));
        assert_eq!(value["config_user_name_error"], json!("exit code 1"));
        assert!(value.get("category").is_none());
    }
}
