pub mod capture;
pub mod io;
pub mod steps;

pub use capture::{capture_snapshot, CaptureOptions};
pub use io::{load_snapshot, save_snapshot, yaml_supported, SnapshotError, SnapshotFormat};
