mod config;
mod decider;
mod locator;
mod logging;
mod procfs;
mod sampler;
mod supervisor;
#[cfg(test)]
mod testing;

use clap::{CommandFactory, Parser};
use config::{ConfigError, HerderConfig, Overrides};
use logging::LogTarget;
use procfs::ProcFs;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor::Supervisor;

const DEFAULT_CONFIG: &str = "herder.toml";

/// Flags that may also be spelled with a single dash (`-name foo`).
const SINGLE_DASH_FLAGS: &[&str] = &["name", "limit", "grace", "samples", "config"];

/// Watch one process by name and kill it when it keeps burning CPU above a
/// limit for several samples in a row.
#[derive(Parser, Debug)]
#[command(name = "herder", version, about)]
pub struct Cli {
    /// Process name to monitor (exact match)
    #[arg(long, allow_hyphen_values = true)]
    name: Option<String>,

    /// Load limit: CPU seconds per wall-clock second [default: 0.7]
    #[arg(long)]
    limit: Option<f64>,

    /// Grace period after kill in seconds [default: 20]
    #[arg(long)]
    grace: Option<u64>,

    /// Number of times in a row the process must be over the limit before it is killed [default: 3]
    #[arg(long)]
    samples: Option<u32>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (acquisition attempts, every sample)
    #[arg(short, long)]
    verbose: bool,

    /// Log to stderr instead of syslog
    #[arg(long)]
    stderr: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            name: self.name.clone(),
            limit: self.limit,
            grace_secs: self.grace,
            samples: self.samples,
        }
    }
}

/// Rewrite `-name`, `-name=x` and friends to their `--` form so the
/// traditional single-dash spelling keeps working with clap. The value
/// following a flag is never rewritten, so `-name -limit` watches a process
/// called `-limit`.
fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    let mut value_next = false;
    for arg in args {
        if passthrough || value_next {
            value_next = false;
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        let Some(s) = arg.to_str() else {
            out.push(arg);
            continue;
        };
        value_next = takes_value(s);
        let rewritten = s
            .strip_prefix('-')
            .filter(|rest| !rest.starts_with('-'))
            .filter(|flag| {
                let key = flag.split_once('=').map_or(*flag, |(key, _)| key);
                SINGLE_DASH_FLAGS.contains(&key)
            })
            .map(|flag| OsString::from(format!("--{flag}")));
        out.push(rewritten.unwrap_or(arg));
    }
    out
}

/// Whether `arg` is a value-taking flag whose value is the next argument.
fn takes_value(arg: &str) -> bool {
    if arg == "-c" {
        return true;
    }
    let key = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'));
    key.is_some_and(|key| !key.contains('=') && SINGLE_DASH_FLAGS.contains(&key))
}

fn print_usage() {
    println!("\nPlease specify at least -name parameter:");
    // Best effort; stdout being closed is no reason to fail.
    let _ = Cli::command().print_help();
    println!();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let mut config = match HerderConfig::load_or_default(&config_path, required) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("herder: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.monitor.apply(&cli.overrides());

    let settings = match config.monitor.resolve() {
        Ok(settings) => settings,
        Err(ConfigError::MissingName) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("herder: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        println!("{settings}");
        return ExitCode::SUCCESS;
    }

    let target = if cli.stderr {
        LogTarget::Stderr
    } else {
        LogTarget::Syslog
    };
    logging::init(target, cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    Supervisor::new(ProcFs::new(), settings).run().await;
    ExitCode::SUCCESS
}
