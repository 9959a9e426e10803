//! datascope command-line tool
//!
//! Validates policy declaration tables and explains how a statement's filter
//! is rewritten for a given user.

mod executor;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// datascope policy tool
#[derive(Parser, Debug)]
#[command(name = "datascope")]
#[command(version, about = "Row-level data-permission policy tool")]
pub struct Args {
    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", value_enum, global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a policy declaration table
    Check {
        /// Policy declaration file (JSON)
        #[arg(long)]
        policies: PathBuf,
    },

    /// Show the filter a statement receives for a user
    Explain {
        /// Policy declaration file (JSON)
        #[arg(long)]
        policies: PathBuf,

        /// Acting user (JSON)
        #[arg(long)]
        user: PathBuf,

        /// Department and role directory (JSON)
        #[arg(long)]
        directory: PathBuf,

        /// Query identifier, e.g. SysUserMapper.selectUserList
        #[arg(long)]
        query: String,

        /// Treat the statement as a write
        #[arg(long)]
        write: bool,

        /// Existing WHERE fragment of the statement
        #[arg(long)]
        filter: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datascope=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    match executor::run(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}
