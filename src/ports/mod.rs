//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the batch engine and something
//! outside it (time, the payments provider, code generation, the output
//! files). Implementations live in `src/adapters/` and `src/sink.rs`.

pub mod clock;
pub mod code_gen;
pub mod payments;
pub mod sink;

pub use clock::{Clock, SleepFuture};
pub use code_gen::CodeGenerator;
pub use payments::{
    CouponRequest, CreatedCoupon, IssuedCode, PaymentsApi, PaymentsFuture, PromotionCodeRequest,
};
pub use sink::{RecordSink, SinkSummary};
