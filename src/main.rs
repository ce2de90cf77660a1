use anyhow::Result;
use clap::Parser;
use pb_checker::config::Config;
use pb_checker::driver::{process_batch, Input};
use std::path::PathBuf;

/// Validates participatory-budgeting (.pb) data files and prints a JSON report.
#[derive(Parser, Debug)]
#[command(name = "pb-checker", version, about)]
struct Cli {
    /// One or more .pb files to validate.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Pretty-print the JSON report.
    #[arg(long, conflicts_with = "compact")]
    pretty: bool,

    /// Emit the JSON report on one line.
    #[arg(long, conflicts_with = "pretty")]
    compact: bool,

    /// Print progress to stderr as each file is processed (-v, -vv).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();
    let pretty = if cli.compact {
        false
    } else if cli.pretty {
        true
    } else {
        config.display.pretty
    };

    let verbosity = if cli.verbose > 0 { cli.verbose } else { config.display.verbosity };
    let inputs: Vec<Input> = cli.files.iter().map(|p| Input::from(p.as_path())).collect();
    let report = process_batch(inputs, verbosity);

    let json = report.to_json();
    if pretty {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", serde_json::to_string(&json)?);
    }

    if report.metadata().invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}
