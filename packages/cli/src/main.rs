#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the accident warehouse.
//!
//! `build` turns a cleaned accident CSV into dimension, fact, and aggregate
//! tables; `verify` checks a written output directory against its
//! manifest; `config` prints the effective configuration. Run without a
//! subcommand for an interactive menu.
//!
//! Uses `indicatif-log-bridge` (via
//! [`accident_warehouse_cli_utils::init_logger`]) to route `log` output
//! through `indicatif::MultiProgress` so that log lines and progress bars
//! never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "accident_warehouse",
    about = "Star-schema warehouse builder for traffic accident data"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the warehouse from a cleaned accident CSV
    Build {
        /// Cleaned input CSV
        #[arg(long)]
        input: PathBuf,

        /// Output directory for tables, manifest, and quality report
        #[arg(long)]
        output: PathBuf,

        /// TOML configuration file (defaults are used when omitted)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Rebuild even if the output is up to date
        #[arg(long)]
        force: bool,
    },
    /// Check a written output directory against its manifest
    Verify {
        /// Output directory to check
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the effective configuration as TOML
    Config {
        /// TOML configuration file to merge over the defaults
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = accident_warehouse_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Build {
            input,
            output,
            config,
            force,
        }) => commands::build(&multi, &input, &output, config.as_deref(), force)?,
        Some(Commands::Verify { output }) => commands::verify(&output)?,
        Some(Commands::Config { config }) => commands::print_config(config.as_deref())?,
        None => interactive::run(&multi)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_flags() {
        let cli = Cli::try_parse_from([
            "accident_warehouse",
            "build",
            "--input",
            "cleaned.csv",
            "--output",
            "out",
            "--force",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Build {
                input,
                output,
                config,
                force,
            }) => {
                assert_eq!(input, PathBuf::from("cleaned.csv"));
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(config, None);
                assert!(force);
            }
            _ => panic!("expected build"),
        }
    }

    #[test]
    fn no_subcommand_is_interactive() {
        let cli = Cli::try_parse_from(["accident_warehouse"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn build_requires_input() {
        assert!(Cli::try_parse_from(["accident_warehouse", "build", "--output", "out"]).is_err());
    }
}
