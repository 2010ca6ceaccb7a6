//! reportsmith CLI - build reports from a YAML config
//!
//! ```bash
//! reportsmith new                     # Write a config template to report.yaml
//! reportsmith run -c report.yaml      # Build tables, run queries, export
//! reportsmith run -vv --database      # More output, also save the database
//! ```

use clap::{CommandFactory, Parser, Subcommand};
use reportsmith::{run_report, settings, RunLog, RunOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reportsmith", version)]
#[command(about = "Build reports from CSV and XLSX sources with SQL", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the report described by a config file
    Run {
        /// Config file
        #[arg(short, long, default_value = settings::DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Show more output (up to -vvv)
        #[arg(short, long, action = clap::ArgAction::Count)]
        verbose: u8,

        /// Also export the working database to <basename>.db
        #[arg(long)]
        database: bool,

        /// Overwrite existing output files
        #[arg(long)]
        force: bool,
    },

    /// Write a config template
    New {
        /// Where to write the template
        #[arg(short, long, default_value = settings::DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

const WELCOME: &str = "\
reportsmith builds reports from CSV and XLSX files.

  reportsmith new          write a config template to report.yaml
  reportsmith run          run the report in report.yaml
  reportsmith run --help   list run options";

fn main() {
    let cli = Cli::parse();
    let mut show_causes = false;

    let result = match cli.command {
        None => {
            println!("{}", WELCOME);
            Ok(())
        }

        Some(Commands::Run {
            config,
            verbose,
            database,
            force,
        }) => {
            if verbose > settings::MAX_VERBOSE {
                Cli::command()
                    .error(
                        clap::error::ErrorKind::TooManyValues,
                        format!("-v can be given at most {} times", settings::MAX_VERBOSE),
                    )
                    .exit();
            }
            init_tracing(verbose);
            show_causes = verbose >= settings::MAX_VERBOSE;
            cmd_run(&config, RunOptions { database, force })
        }

        Some(Commands::New { path, force }) => {
            init_tracing(0);
            cmd_new(&path, force)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        if show_causes {
            print_causes(e.as_ref());
        }
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("reportsmith={}", level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(config: &Path, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut log = RunLog::new();
    run_report(config, options, &mut log).map_err(|e| {
        tracing::debug!("Run stopped during: {}", e.stage());
        e
    })?;
    Ok(())
}

/// Source chain of an error, skipping causes that repeat the message above.
fn print_causes(error: &dyn std::error::Error) {
    let mut previous = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if text != previous {
            eprintln!("Caused by: {}", text);
        }
        previous = text;
        source = cause.source();
    }
}

fn cmd_new(path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() && !force {
        return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
    }
    fs::write(path, settings::DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Wrote config template to {}", path.display());
    Ok(())
}
