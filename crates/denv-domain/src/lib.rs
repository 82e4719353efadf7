#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

pub mod classify;
pub mod parse;
pub mod platform;
pub mod registry;
pub mod snapshot;
pub mod taxonomy;
pub mod tree;
pub mod version;

pub use classify::{
    classify_evidence, DependencyReport, Evidence, EvidenceDependencies, ProjectAnalysis,
    ProjectCategory, ProjectType,
};
pub use parse::{extract_version, parse_output, snake_case, ParsedOutput};
pub use platform::Platform;
pub use registry::{builtin_registry, commands_for, commands_in_category, FormatHint, ToolSpec};
pub use snapshot::{sha256_hex, EnvironmentSnapshot, ReproductionResult, SCHEMA_VERSION};
pub use taxonomy::{all_categories, fields_of, tool_allowed_on};
pub use tree::{tool_path, ToolResult, ToolTree};
pub use version::{
    classify_tool, compare_versions, version_critical_tools, Compatibility, ToolClass, VersionMode,
};
