//! Resolves (and if necessary downloads) the `yq` binary, then prints its
//! location.
//!
//! Configuration comes from the `YQ_*` environment variables described in
//! [`yq_provision::ProvisionConfig`]. Diagnostics go to stderr and are
//! filtered with `RUST_LOG`; stdout carries only the result so the command
//! composes in shell pipelines. The binary exits with status code `0` on
//! success and `1` on error.

use std::io::{self, Write};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};
use serde_json::json;
use tracing_subscriber::EnvFilter;
use yq_provision::{BinaryProvisioner, ProvisionConfig};

/// Locates a usable `mikefarah/yq`, downloading a verified release when needed.
#[derive(Debug, Parser)]
#[command(name = "yq-provision", version, about, long_about = None)]
struct Args {
    /// Emit machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Print the path of a usable yq binary (default).
    Resolve,
    /// Resolve the binary and confirm it runs.
    Validate,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let config = ProvisionConfig::from_env().wrap_err("invalid YQ_* configuration")?;
    let provisioner = BinaryProvisioner::new(config);
    let mut stdout = io::stdout().lock();

    match args.command.unwrap_or(Command::Resolve) {
        Command::Resolve => {
            let path = provisioner.resolve()?;
            if args.json {
                writeln!(stdout, "{}", json!({ "path": path }))?;
            } else {
                writeln!(stdout, "{path}")?;
            }
        }
        Command::Validate => {
            let validated = provisioner.validate()?;
            if args.json {
                writeln!(stdout, "{}", serde_json::to_string(&validated)?)?;
            } else {
                writeln!(stdout, "{}\n{}", validated.path, validated.version)?;
            }
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_directive = if verbose {
        "yq_provision=debug"
    } else {
        "yq_provision=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .wrap_err("invalid RUST_LOG filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| color_eyre::eyre::eyre!(err))
}
