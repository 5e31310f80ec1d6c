//! Code generator port for producing candidate redemption codes.

/// Generates candidate redemption code strings.
///
/// Uniqueness is not enforced here; the provider rejects duplicates.
pub trait CodeGenerator: Send + Sync {
    /// Generates a new code string.
    fn generate_code(&self) -> String;
}
