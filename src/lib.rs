//! Core library entry for the `promobatch` CLI.
//!
//! A run creates one campaign on the payments provider, then issues its
//! single-use redemption codes in fixed-size batches through a bounded worker
//! pool, writing every issued code to rotating CSV files.

pub mod adapters;
pub mod campaign;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod issuer;
pub mod logging;
pub mod ports;
pub mod progress;
pub mod scheduler;
pub mod sink;

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli.command)
}
