//! In-process adapters that stand in for the provider and the wall clock.
//!
//! Used by `generate --dry-run` to rehearse a run without network access, and
//! by tests to script provider failures and observe requested delays.

pub mod clock;
pub mod payments;

pub use clock::ManualClock;
pub use payments::SimulatedPayments;
