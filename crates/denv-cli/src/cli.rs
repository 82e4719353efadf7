use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "denv",
    version,
    about = "Deterministic development-environment toolkit",
    propagate_version = true
)]
pub struct DenvCli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Maximum log verbosity.
    #[arg(long, global = true)]
    pub trace: bool,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: CommandCli,
}

#[derive(Debug, Subcommand)]
pub enum CommandCli {
    /// Probe the host for installed development tools.
    Diagnose(DiagnoseArgs),
    /// Classify a project directory.
    Classify(ClassifyArgs),
    /// Capture an environment snapshot.
    Snapshot(SnapshotArgs),
    /// Verify or restore an environment from a snapshot file.
    Reproduce(ReproduceArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FormatCli {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for FormatCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        })
    }
}

#[derive(Debug, Args)]
pub struct DiagnoseArgs {
    /// Restrict the run to these category prefixes.
    #[arg(long, value_delimiter = ',', value_name = "CATEGORY")]
    pub categories: Vec<String>,

    /// Restrict the run to these tools (intersected with --categories).
    #[arg(long, value_delimiter = ',', value_name = "TOOL")]
    pub tools: Vec<String>,

    /// Omit the base system report.
    #[arg(long)]
    pub no_system_info: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: FormatCli,

    /// Write the report to a file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// List the available tool categories and exit.
    #[arg(
        long,
        conflicts_with_all = ["list_tools", "categories", "tools", "output"]
    )]
    pub list_categories: bool,

    /// List every registered tool and exit.
    #[arg(long, conflicts_with_all = ["categories", "tools", "output"])]
    pub list_tools: bool,
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Project directory to classify.
    #[arg(default_value = ".", value_name = "PATH")]
    pub path: PathBuf,

    #[arg(long, value_enum, default_value_t)]
    pub format: FormatCli,

    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    /// Project directory to include in the snapshot.
    #[arg(default_value = ".", value_name = "PATH")]
    pub path: PathBuf,

    /// Snapshot file to write (default: <snapshot_id>.<format>).
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    pub format: FormatCli,

    /// Capture lock files only, skipping config files.
    #[arg(long)]
    pub no_configs: bool,

    /// Reproduce the snapshot into a scratch directory right away and
    /// report the verification outcome.
    #[arg(long)]
    pub verify: bool,
}

#[derive(Debug, Args)]
pub struct ReproduceArgs {
    /// Snapshot file to verify against.
    #[arg(value_name = "SNAPSHOT")]
    pub snapshot: PathBuf,

    /// Restore the captured project files into this directory.
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Demand exact versions for version-critical tools.
    #[arg(long)]
    pub strict: bool,

    /// Install dependencies from the restored lock file.
    #[arg(long, requires = "target")]
    pub auto_install: bool,

    /// Fail immediately when the host platform differs from the capture
    /// platform.
    #[arg(long)]
    pub require_same_platform: bool,

    #[arg(long, value_enum, default_value_t)]
    pub format: FormatCli,

    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        DenvCli::command().debug_assert();
    }

    #[test]
    fn diagnose_lists_conflict_with_filters() {
        let result = DenvCli::try_parse_from([
            "denv",
            "diagnose",
            "--list-categories",
            "--tools",
            "git",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn category_lists_split_on_commas() {
        let cli = DenvCli::try_parse_from([
            "denv",
            "diagnose",
            "--categories",
            "build_tools,version_control",
        ])
        .unwrap();
        match cli.command {
            CommandCli::Diagnose(args) => {
                assert_eq!(args.categories, vec!["build_tools", "version_control"]);
            }
            other => panic!("expected diagnose, got {other:?}"),
        }
    }

    #[test]
    fn auto_install_requires_a_target() {
        let result =
            DenvCli::try_parse_from(["denv", "reproduce", "snap.json", "--auto-install"]);
        assert!(result.is_err());
    }
}
