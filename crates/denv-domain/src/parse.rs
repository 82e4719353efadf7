//! Probe output parsing.
//!
//! Turns raw command output into a structured mapping plus the lines that
//! could not be structured. The parser is total: malformed input yields an
//! empty mapping, never an error, because by the time output reaches the
//! parser the command itself has already succeeded.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::registry::FormatHint;

/// Parsed command output: structured fields plus leftover lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub fields: IndexMap<String, Value>,
    pub unparsed: Vec<String>,
}

impl ParsedOutput {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.unparsed.is_empty()
    }

    /// Folds the unparsed lines into the fields under `additional_info`,
    /// only when any exist.
    pub fn into_fields(mut self) -> IndexMap<String, Value> {
        if !self.unparsed.is_empty() {
            let lines = self.unparsed.drain(..).map(Value::String).collect();
            self.fields
                .insert("additional_info".to_string(), Value::Array(lines));
        }
        self.fields
    }
}

/// Parses `text` according to `hint`. `Auto` tries JSON, then YAML, then
/// key/value; the first attempt yielding a non-empty mapping wins.
pub fn parse_output(text: &str, hint: FormatHint) -> ParsedOutput {
    match hint {
        FormatHint::Json => parse_json(text),
        FormatHint::Yaml => parse_yaml(text),
        FormatHint::KeyValue => parse_key_value(text),
        FormatHint::Auto => {
            let parsed = parse_json(text);
            if !parsed.fields.is_empty() {
                return parsed;
            }
            let parsed = parse_yaml(text);
            if !parsed.fields.is_empty() {
                return parsed;
            }
            parse_key_value(text)
        }
    }
}

fn parse_json(text: &str) -> ParsedOutput {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => ParsedOutput {
            fields: wrap_top_level(value),
            unparsed: Vec::new(),
        },
        Err(_) => ParsedOutput::default(),
    }
}

#[cfg(feature = "yaml")]
fn parse_yaml(text: &str) -> ParsedOutput {
    match serde_yaml::from_str::<Value>(text) {
        Ok(value) => ParsedOutput {
            fields: wrap_top_level(value),
            unparsed: Vec::new(),
        },
        Err(_) => ParsedOutput::default(),
    }
}

#[cfg(not(feature = "yaml"))]
fn parse_yaml(_text: &str) -> ParsedOutput {
    ParsedOutput::default()
}

/// A non-object top level is preserved under a `data` key so that every
/// parse result stays addressable by path.
fn wrap_top_level(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        Value::Null => IndexMap::new(),
        other => {
            let mut fields = IndexMap::new();
            fields.insert("data".to_string(), other);
            fields
        }
    }
}

static KEY_VALUE_COLON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:=]+?)\s*:\s*(.+)$").expect("valid regex"));
static KEY_VALUE_EQUALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^=]+?)\s*=\s*(.+)$").expect("valid regex"));
// Bare `key value` lines (tool banners like `version 1.2.3`) parse too; a
// line with no separator at all is what ends up in additional_info.
static KEY_VALUE_SPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S.*)$").expect("valid regex"));

fn parse_key_value(text: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput::default();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let captures = KEY_VALUE_COLON
            .captures(line)
            .or_else(|| KEY_VALUE_EQUALS.captures(line))
            .or_else(|| KEY_VALUE_SPACE.captures(line));
        match captures {
            Some(captures) => {
                let key = snake_case(captures[1].trim());
                let value = coerce_value(captures[2].trim());
                parsed.fields.insert(key, value);
            }
            None => parsed.unparsed.push(line.to_string()),
        }
    }
    parsed
}

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-]+").expect("valid regex"));

/// Normalizes a key to snake_case: spaces and hyphens become underscores and
/// camel-case boundaries are split.
pub fn snake_case(input: &str) -> String {
    let spaced = SEPARATORS.replace_all(input, "_");
    CAMEL_BOUNDARY
        .replace_all(&spaced, "${1}_${2}")
        .to_lowercase()
}

/// Coerces a textual value to a bool, integer or float where unambiguous.
fn coerce_value(value: &str) -> Value {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "enabled" => return Value::Bool(true),
        "false" | "no" | "off" | "disabled" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(int) = value.parse::<i64>() {
        return Value::Number(int.into());
    }
    if value.contains('.') {
        if let Ok(float) = value.parse::<f64>() {
            if let Some(number) = serde_json::Number::from_f64(float) {
                return Value::Number(number);
            }
        }
    }
    Value::String(value.to_string())
}

static VERSION_PREFIXED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:version|v)\s+(\d+(?:\.\d+)*(?:[-\w]+)?)").expect("valid regex")
});
static VERSION_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)*(?:[-\w]+)?)").expect("valid regex"));

/// Extracts a version string from free text, recognizing `version 1.2.3`,
/// `v1.2.3` and bare dotted numbers with an optional tag.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION_PREFIXED
        .captures(text)
        .or_else(|| VERSION_BARE.captures(text))
        .map(|captures| captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_parses_directly() {
        let parsed = parse_output(r#"{"name": "pip", "version": "24.0"}"#, FormatHint::Json);
        assert_eq!(parsed.fields["name"], Value::String("pip".into()));
        assert!(parsed.unparsed.is_empty());
    }

    #[test]
    fn json_non_object_wraps_under_data() {
        let parsed = parse_output(r#"[1, 2, 3]"#, FormatHint::Json);
        assert_eq!(parsed.fields["data"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn json_garbage_yields_empty_mapping() {
        let parsed = parse_output("not json at all {", FormatHint::Json);
        assert!(parsed.fields.is_empty());
    }

    #[test]
    fn key_value_handles_colons_equals_and_spaces() {
        let text = "version 1.2.3-rc1\nplatform: linux\ncpu_cores = 8\n";
        let parsed = parse_output(text, FormatHint::KeyValue);
        assert_eq!(
            parsed.fields["version"],
            Value::String("1.2.3-rc1".into())
        );
        assert_eq!(parsed.fields["platform"], Value::String("linux".into()));
        assert_eq!(parsed.fields["cpu_cores"], Value::Number(8.into()));
        assert!(parsed.unparsed.is_empty());
    }

    #[test]
    fn key_value_coerces_booleans() {
        let text = "color: enabled\ntelemetry = off\nverbose: Yes\n";
        let parsed = parse_output(text, FormatHint::KeyValue);
        assert_eq!(parsed.fields["color"], Value::Bool(true));
        assert_eq!(parsed.fields["telemetry"], Value::Bool(false));
        assert_eq!(parsed.fields["verbose"], Value::Bool(true));
    }

    #[test]
    fn key_value_coerces_floats() {
        let parsed = parse_output("load average: 0.52", FormatHint::KeyValue);
        assert_eq!(parsed.fields["load_average"], serde_json::json!(0.52));
    }

    #[test]
    fn auto_prefers_json_then_falls_back() {
        let parsed = parse_output(r#"{"a": 1}"#, FormatHint::Auto);
        assert_eq!(parsed.fields["a"], Value::Number(1.into()));

        let parsed = parse_output("key: value", FormatHint::Auto);
        assert!(parsed.fields.contains_key("key"));
    }

    #[test]
    fn unparsed_lines_fold_into_additional_info_only_when_present() {
        let parsed = parse_output("FEATURES\nkey: value\n", FormatHint::KeyValue);
        let fields = parsed.into_fields();
        assert_eq!(fields["additional_info"], serde_json::json!(["FEATURES"]));

        let parsed = parse_output("key: value", FormatHint::KeyValue);
        let fields = parsed.into_fields();
        assert!(!fields.contains_key("additional_info"));
    }

    #[test]
    fn snake_case_normalization() {
        assert_eq!(snake_case("CPU Cores"), "cpu_cores");
        assert_eq!(snake_case("server-version"), "server_version");
        assert_eq!(snake_case("storageDriver"), "storage_driver");
        assert_eq!(snake_case("already_snake"), "already_snake");
    }

    #[test]
    fn version_extraction_patterns() {
        assert_eq!(extract_version("Python 3.11.5"), Some("3.11.5".into()));
        assert_eq!(extract_version("git version 2.39.3"), Some("2.39.3".into()));
        assert_eq!(
            extract_version("black, 23.7.0 (compiled: yes)"),
            Some("23.7.0".into())
        );
        assert_eq!(extract_version("v1.2.3"), Some("1.2.3".into()));
        assert_eq!(extract_version("Version 4.5.6"), Some("4.5.6".into()));
        assert_eq!(extract_version("uv 0.1.32"), Some("0.1.32".into()));
        assert_eq!(extract_version("no version here"), None);
        assert_eq!(extract_version(""), None);
    }

    #[test]
    fn identical_input_yields_identical_output() {
        let text = "a: 1\nb = two\nnoise\n";
        assert_eq!(
            parse_output(text, FormatHint::Auto),
            parse_output(text, FormatHint::Auto)
        );
    }
}
