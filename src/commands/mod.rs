//! Command dispatch and handlers.

pub mod generate;
pub mod preview;

use crate::cli::Command;

/// Dispatch a parsed command to its handler.
///
/// # Errors
///
/// Returns an error string if the selected command handler fails.
pub fn dispatch(command: &Command) -> Result<(), String> {
    match command {
        Command::Generate(args) => generate::run(args),
        Command::Preview { count, prefix, length } => preview::run(*count, prefix, *length),
    }
}
