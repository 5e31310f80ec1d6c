//! Payments API port for creating discounts and redemption codes.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::campaign::{Discount, DurationPolicy};
use crate::error::ApiError;

/// Boxed future type alias used by [`PaymentsApi`] to keep the trait dyn-compatible.
pub type PaymentsFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Request to create the parent discount definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponRequest {
    /// Display name.
    pub name: String,
    /// Discount shape.
    pub discount: Discount,
    /// Duration policy.
    pub duration: DurationPolicy,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

/// The created parent discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCoupon {
    /// Provider identifier.
    pub id: String,
}

/// Request to create one redemption code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCodeRequest {
    /// Parent discount identifier.
    pub coupon_id: String,
    /// Redemption cap; always 1 for single-use codes.
    pub max_redemptions: u32,
    /// Instant after which the code stops working.
    pub expires_at: DateTime<Utc>,
    /// Explicit code string, or `None` to let the provider pick one.
    pub code: Option<String>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
    /// Key that makes repeated submissions of the same task safe.
    pub idempotency_key: String,
}

/// A redemption code the provider accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    /// Provider identifier of the code object.
    pub id: String,
    /// The redeemable code string.
    pub code: String,
}

/// Creates discount resources on an external payments provider.
pub trait PaymentsApi: Send + Sync {
    /// Creates the parent discount definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider refuses or cannot be reached.
    fn create_coupon(&self, request: &CouponRequest) -> PaymentsFuture<'_, CreatedCoupon>;

    /// Creates one redemption code under an existing discount.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::RateLimited`] when throttled, another variant otherwise.
    fn create_promotion_code(
        &self,
        request: &PromotionCodeRequest,
    ) -> PaymentsFuture<'_, IssuedCode>;
}
