//! Live adapters for real external interactions.

pub mod clock;
pub mod code_gen;
pub mod stripe;
