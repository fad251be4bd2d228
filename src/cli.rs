// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagweave`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagweave",
    version,
    about = "Run templated DAG workflows described in a TOML manifest.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow manifest (TOML).
    #[arg(long, value_name = "PATH", default_value = "dagweave.toml")]
    pub manifest: String,

    /// Run this template instead of the manifest's entrypoint.
    #[arg(long, value_name = "NAME")]
    pub entrypoint: Option<String>,

    /// Set or override a workflow parameter. Repeatable.
    #[arg(
        short = 'p',
        long = "param",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value
    )]
    pub params: Vec<(String, String)>,

    /// Maximum number of script tasks running at once.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Stop scheduling new tasks as soon as one fails.
    #[arg(long)]
    pub fail_fast: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGWEAVE_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the manifest and print every DAG, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// `key=value` -> `("key", "value")`. The value may itself contain `=`.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
