//! incprof CLI - run programs under the interval-profiling agent.

mod offset;
mod spawn;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use incprof_protocol::number::parse_number;

use crate::spawn::RunOptions;

#[derive(Parser)]
#[command(name = "incprof")]
#[command(version, about = "Interval snapshots of gprof data from running programs", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a gprof-instrumented program with the sampling agent preloaded
    Run {
        /// Executable name the agent attaches to [default: program base name]
        #[arg(long, value_name = "NAME")]
        app_name: Option<String>,

        /// Directory for gmon-<n>.out snapshots [default: current directory]
        #[arg(short = 'd', long, value_name = "DIR")]
        data_dir: Option<PathBuf>,

        /// Byte offset from moncontrol to write_gmon (decimal or 0x hex)
        #[arg(long, value_name = "BYTES", value_parser = parse_integer, allow_hyphen_values = true)]
        offset: Option<i64>,

        /// Whole seconds between snapshots
        #[arg(long, value_name = "N", value_parser = parse_unsigned)]
        seconds: Option<u64>,

        /// Microseconds between snapshots (added to --seconds)
        #[arg(long, value_name = "N", value_parser = parse_unsigned)]
        useconds: Option<u64>,

        /// Agent diagnostics on stderr and a per-sample ipr.log
        #[arg(long)]
        debug: bool,

        /// Program and arguments
        #[arg(trailing_var_arg = true, required = true)]
        program: Vec<String>,
    },

    /// Compute IPR_GMONOFFSET for a C library image
    FindOffset {
        /// Path to the C library (e.g. /lib/x86_64-linux-gnu/libc.so.6)
        library: PathBuf,

        /// Exported symbol the offset is measured from
        #[arg(long, default_value = offset::DEFAULT_ANCHOR)]
        anchor: String,
    },
}

fn parse_integer(s: &str) -> Result<i64, String> {
    parse_number(s).ok_or_else(|| format!("'{}' is not a decimal or hex integer", s))
}

fn parse_unsigned(s: &str) -> Result<u64, String> {
    let v = parse_integer(s)?;
    u64::try_from(v).map_err(|_| format!("'{}' must not be negative", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            app_name,
            data_dir,
            offset,
            seconds,
            useconds,
            debug,
            program,
        } => {
            let options = RunOptions {
                app_name,
                data_dir,
                offset,
                seconds,
                useconds,
                debug,
            };
            let code = spawn::run(&options, &program)?;
            std::process::exit(code);
        }
        Commands::FindOffset { library, anchor } => {
            let data = std::fs::read(&library)
                .with_context(|| format!("Failed to read {}", library.display()))?;
            let report = offset::find_offset(&data, &anchor)
                .with_context(|| format!("No offset found in {}", library.display()))?;
            print!("{}", report);
        }
    }

    Ok(())
}
