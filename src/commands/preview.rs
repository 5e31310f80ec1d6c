//! `promobatch preview` command.

use crate::adapters::live::code_gen::RandomCodeGenerator;
use crate::ports::CodeGenerator;

/// Execute the `preview` command.
///
/// Prints `count` codes in the shape `generate --code-length` would request.
/// Nothing is sent to the provider.
///
/// # Errors
///
/// Returns an error string if `length` is zero.
pub fn run(count: usize, prefix: &str, length: usize) -> Result<(), String> {
    for code in sample(count, prefix, length)? {
        println!("{code}");
    }
    Ok(())
}

fn sample(count: usize, prefix: &str, length: usize) -> Result<Vec<String>, String> {
    if length == 0 {
        return Err("--length must be greater than 0".to_string());
    }
    let generator = RandomCodeGenerator::new(prefix, length);
    Ok((0..count).map(|_| generator.generate_code()).collect())
}
