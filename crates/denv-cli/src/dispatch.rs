use anyhow::Result;
use denv_core::api;
use denv_core::{ReproduceOptions, SnapshotFormat, VersionMode};

use crate::cli::{
    ClassifyArgs, CommandCli, DiagnoseArgs, FormatCli, ReproduceArgs, SnapshotArgs,
};
use crate::output::{emit, render};

/// Executes a parsed command and returns the process exit code.
pub fn dispatch_command(command: &CommandCli) -> Result<i32> {
    match command {
        CommandCli::Diagnose(args) => run_diagnose(args),
        CommandCli::Classify(args) => run_classify(args),
        CommandCli::Snapshot(args) => run_snapshot(args),
        CommandCli::Reproduce(args) => run_reproduce(args),
    }
}

fn run_diagnose(args: &DiagnoseArgs) -> Result<i32> {
    if args.list_categories {
        println!("Available tool categories:");
        for category in api::list_categories() {
            println!("  - {category}");
        }
        return Ok(0);
    }
    if args.list_tools {
        println!("Available tools:");
        let mut tools = api::list_tools();
        tools.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)));
        let mut current_category = String::new();
        for (tool, category) in tools {
            if category != current_category {
                println!("  {category}:");
                current_category = category;
            }
            println!("    - {tool}");
        }
        return Ok(0);
    }

    let options = api::DiagnoseOptions {
        categories: args.categories.clone(),
        tools: args.tools.clone(),
        include_system_info: !args.no_system_info,
        ..api::DiagnoseOptions::default()
    };
    let document = api::diagnose(&options);
    let text = render(&document, args.format)?;
    Ok(emit(&text, args.output.as_deref()))
}

fn run_classify(args: &ClassifyArgs) -> Result<i32> {
    let analysis = api::classify(&args.path)?;
    let text = render(&analysis, args.format)?;
    Ok(emit(&text, args.output.as_deref()))
}

fn run_snapshot(args: &SnapshotArgs) -> Result<i32> {
    let format = match args.format {
        FormatCli::Json => SnapshotFormat::Json,
        FormatCli::Yaml if denv_core::yaml_supported() => SnapshotFormat::Yaml,
        FormatCli::Yaml => {
            eprintln!("warning: YAML support was not built in; writing JSON instead");
            SnapshotFormat::Json
        }
    };
    let request = api::SnapshotRequest {
        project: Some(args.path.clone()),
        output: args.output.clone(),
        format,
        include_configs: !args.no_configs,
        verify: args.verify,
    };
    let outcome = api::snapshot(&request)?;
    eprintln!("Snapshot saved to: {}", outcome.path.display());
    if let Some(verification) = &outcome.verification {
        let text = render(verification, args.format)?;
        println!("{text}");
        if !verification.success {
            return Ok(1);
        }
    }
    Ok(0)
}

fn run_reproduce(args: &ReproduceArgs) -> Result<i32> {
    let options = ReproduceOptions {
        target: args.target.clone(),
        mode: if args.strict {
            VersionMode::Strict
        } else {
            VersionMode::Lenient
        },
        auto_install: args.auto_install,
        require_same_platform: args.require_same_platform,
    };
    let result = api::reproduce_from_file(&args.snapshot, &options)?;
    let text = render(&result, args.format)?;
    let code = emit(&text, args.output.as_deref());
    if code != 0 {
        return Ok(code);
    }
    Ok(i32::from(!result.success))
}
