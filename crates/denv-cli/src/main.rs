#![deny(clippy::all, warnings)]

use clap::Parser;
use color_eyre::{eyre::eyre, Result};

mod cli;
mod dispatch;
mod output;

use cli::DenvCli;
use dispatch::dispatch_command;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = DenvCli::parse();
    init_tracing(&cli);

    let code = dispatch_command(&cli.command).map_err(|error| eyre!("{error:?}"))?;
    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(cli: &DenvCli) {
    let level = if cli.trace {
        "trace"
    } else if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("denv={level},denv_cli={level},denv_core={level},denv_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
