//! Live adapter for the `CodeGenerator` port.

use rand::Rng;

use crate::ports::CodeGenerator;

/// Characters a generated suffix is drawn from.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Returns `prefix` followed by `length` characters drawn uniformly from
/// [`ALPHABET`].
pub fn random_code<R: Rng + ?Sized>(rng: &mut R, prefix: &str, length: usize) -> String {
    let mut code = String::with_capacity(prefix.len() + length);
    code.push_str(prefix);
    for _ in 0..length {
        let idx = rng.gen_range(0..ALPHABET.len());
        code.push(char::from(ALPHABET[idx]));
    }
    code
}

/// Live code generator backed by the thread-local RNG.
pub struct RandomCodeGenerator {
    prefix: String,
    length: usize,
}

impl RandomCodeGenerator {
    /// Creates a generator for codes of the form `<prefix><length chars>`.
    #[must_use]
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self { prefix: prefix.into(), length }
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate_code(&self) -> String {
        random_code(&mut rand::thread_rng(), &self.prefix, self.length)
    }
}
