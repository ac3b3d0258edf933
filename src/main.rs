//! binrpc - inspect and produce HomeMatic BIN-RPC frames
//!
//! Decodes captured frames (hex or raw files) and encodes values, method
//! calls and responses for replay against a CCU or CUxD.

mod commands;
mod config;
mod error;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "binrpc")]
#[command(about = "Inspect and produce HomeMatic BIN-RPC frames")]
#[command(version)]
pub struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "BINRPC_CONFIG")]
    config: Option<PathBuf>,

    /// Decode strings as ISO-8859-1 instead of UTF-8
    #[arg(long)]
    latin1: bool,

    /// Accept multicall arrays that declare zero elements but carry one
    #[arg(long)]
    multicall_recovery: bool,

    /// Print JSON on a single line
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode a frame
    Decode {
        /// Frame as hex, @file for raw bytes, or - for hex on stdin
        input: String,

        /// Show the payload as a plain value sequence instead of a message
        #[arg(long)]
        plain: bool,
    },

    /// Encode JSON values into a frame
    Encode {
        /// Values as JSON (or @file.json to read from file)
        #[arg(allow_negative_numbers = true)]
        values: Vec<String>,

        /// Mark the frame as a response instead of a request
        #[arg(long)]
        response: bool,
    },

    /// Encode a method call
    Request {
        /// Method name, e.g. setValue or system.multicall
        method: String,

        /// Parameters as JSON (or @file.json to read from file)
        #[arg(allow_negative_numbers = true)]
        params: Vec<String>,
    },

    /// Encode a method result or fault
    Response {
        /// Result as JSON; omitted means an empty result
        value: Option<String>,

        /// Encode a fault instead
        #[arg(
            long,
            num_args = 2,
            value_names = ["CODE", "MESSAGE"],
            allow_negative_numbers = true,
            conflicts_with = "value"
        )]
        fault: Option<Vec<String>>,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(2);
        }
    };
    if cli.latin1 {
        config.charset = config::CharsetSetting::Latin1;
    }
    if cli.multicall_recovery {
        config.multicall_recovery = true;
    }
    if cli.compact {
        config.output = config::OutputFormat::Compact;
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match commands::execute(cli.command, &config) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
