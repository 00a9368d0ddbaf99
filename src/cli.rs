//! CLI argument parsing for record-reformer
//!
//! This module provides the command-line interface using clap derive macros.
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: reformer.yaml, env: REFORMER_CONFIG)
//! - `--input` / `-i`: NDJSON input file (default: stdin, env: REFORMER_INPUT)
//! - `--hostname`: Hostname exposed to templates (env: REFORMER_HOSTNAME)
//! - `--validate`: Validate configuration and compile templates, then exit
//! - `--dry-run`: Show the parsed configuration, then exit
//! - `--log-level` / `-l`: Log level (trace/debug/info/warn/error, env: REFORMER_LOG_LEVEL)
//! - `--log-format`: Log format (text/json, env: REFORMER_LOG_FORMAT)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//! - `--stats`: Print pipeline counters to stderr on exit
//!
//! # Hostname precedence
//!
//! 1. `--hostname` / `REFORMER_HOSTNAME`
//! 2. `hostname` in the configuration file
//! 3. The system hostname

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// record-reformer - re-tag and reshape structured events
///
/// Reads NDJSON events, rewrites their tag and record from the configured
/// templates and writes the result as NDJSON to stdout.
#[derive(Parser, Debug)]
#[command(name = "record-reformer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "reformer.yaml",
        env = "REFORMER_CONFIG"
    )]
    pub config: PathBuf,

    /// NDJSON input file (reads stdin when omitted)
    #[arg(short, long, value_name = "FILE", env = "REFORMER_INPUT")]
    pub input: Option<PathBuf>,

    /// Hostname exposed to templates (overrides config file)
    #[arg(long, value_name = "NAME", env = "REFORMER_HOSTNAME")]
    pub hostname: Option<String>,

    /// Validate configuration and compile templates without processing events
    #[arg(long)]
    pub validate: bool,

    /// Show the parsed configuration without processing events
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "REFORMER_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "text", env = "REFORMER_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,

    /// Print pipeline counters to stderr on exit
    #[arg(long)]
    pub stats: bool,
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log line format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}
