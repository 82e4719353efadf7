#![deny(clippy::all, warnings)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod core;

pub mod api;

pub use crate::core::config::Config;
pub use crate::core::probe::{probe_tool, run_probes, ProbeOptions, ProbeRun};
pub use crate::core::process::{run, ProcessContext, ProcessError, RunOutput, RunRequest};
pub use crate::core::reproduce::{reproduce, ReproduceOptions};
pub use crate::core::snapshot::{
    capture_snapshot, load_snapshot, save_snapshot, yaml_supported, CaptureOptions, SnapshotError,
    SnapshotFormat,
};
pub use api::{
    classify, diagnose, list_categories, list_tools, reproduce_from_file, snapshot,
    DiagnoseOptions, SnapshotOutcome, SnapshotRequest,
};
pub use denv_domain::{
    EnvironmentSnapshot, ProjectAnalysis, ProjectCategory, ProjectType, ReproductionResult,
    VersionMode,
};
