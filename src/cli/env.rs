use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use super::commands::Commands;
use super::output::OutputFormat;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Log line format on stderr
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}
