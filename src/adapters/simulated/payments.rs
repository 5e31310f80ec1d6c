//! Payments provider simulated in memory.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::error::ApiError;
use crate::ports::payments::{
    CouponRequest, CreatedCoupon, IssuedCode, PaymentsApi, PaymentsFuture, PromotionCodeRequest,
};

/// Accepts every request unless told otherwise.
///
/// Failures can be injected two ways: a queue of errors served to the next
/// promotion code calls in order, and a rule rejecting every `n`th call.
#[derive(Default)]
pub struct SimulatedPayments {
    coupon_calls: AtomicU64,
    promotion_calls: AtomicU64,
    issued: AtomicU64,
    scripted: Mutex<VecDeque<ApiError>>,
    reject_every: Option<u64>,
    coupon_error: Option<ApiError>,
    requests: Mutex<Vec<PromotionCodeRequest>>,
}

impl SimulatedPayments {
    /// Creates a provider that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `errors` to the next promotion code calls, then succeeds.
    #[must_use]
    pub fn with_script(errors: impl IntoIterator<Item = ApiError>) -> Self {
        Self { scripted: Mutex::new(errors.into_iter().collect()), ..Self::default() }
    }

    /// Rejects every `n`th promotion code call (1-based) with a 400.
    #[must_use]
    pub fn rejecting_every(n: u64) -> Self {
        Self { reject_every: Some(n.max(1)), ..Self::default() }
    }

    /// Fails every `create_coupon` call with `error`.
    #[must_use]
    pub fn failing_coupon(error: ApiError) -> Self {
        Self { coupon_error: Some(error), ..Self::default() }
    }

    /// Number of `create_coupon` calls received.
    #[must_use]
    pub fn coupon_calls(&self) -> u64 {
        self.coupon_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_promotion_code` calls received.
    #[must_use]
    pub fn promotion_calls(&self) -> u64 {
        self.promotion_calls.load(Ordering::SeqCst)
    }

    /// Every promotion code request received, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<PromotionCodeRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_outcome(&self, call: u64) -> Result<(), ApiError> {
        if let Some(err) = self.scripted.lock().ok().and_then(|mut s| s.pop_front()) {
            return Err(err);
        }
        match self.reject_every {
            Some(n) if call % n == 0 => Err(ApiError::Rejected {
                status: 400,
                message: format!("simulated rejection of call {call}"),
            }),
            _ => Ok(()),
        }
    }
}

impl PaymentsApi for SimulatedPayments {
    fn create_coupon(&self, _request: &CouponRequest) -> PaymentsFuture<'_, CreatedCoupon> {
        let n = self.coupon_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = match &self.coupon_error {
            Some(err) => Err(err.clone()),
            None => Ok(CreatedCoupon { id: format!("co_sim_{n}") }),
        };
        Box::pin(std::future::ready(result))
    }

    fn create_promotion_code(
        &self,
        request: &PromotionCodeRequest,
    ) -> PaymentsFuture<'_, IssuedCode> {
        let call = self.promotion_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let result = self.next_outcome(call).map(|()| {
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            IssuedCode {
                id: format!("promo_sim_{n}"),
                code: request.code.clone().unwrap_or_else(|| format!("SIM{n:08}")),
            }
        });
        Box::pin(std::future::ready(result))
    }
}
