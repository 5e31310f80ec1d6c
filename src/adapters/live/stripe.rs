//! Live adapter for the `PaymentsApi` port using the Stripe REST API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::campaign::Discount;
use crate::error::ApiError;
use crate::ports::payments::{
    CouponRequest, CreatedCoupon, IssuedCode, PaymentsApi, PaymentsFuture, PromotionCodeRequest,
};

/// Default API host.
pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Live payments client that calls the Stripe API.
pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    /// Creates a client authenticating with `api_key` against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("promobatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: Vec<(String, String)>,
        idempotency_key: Option<String>,
    ) -> Result<T, ApiError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key)
            .form(&form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response =
            request.send().await.map_err(|e| ApiError::Transport(format!("{path}: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(format!("failed to read {path} response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(format!("{path}: {e}")))
    }
}

/// Error envelope returned by the Stripe API.
#[derive(Deserialize)]
struct StripeError {
    error: StripeErrorDetail,
}

/// Detail inside a Stripe error envelope.
#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Coupon object (only the fields we read).
#[derive(Deserialize)]
struct StripeCoupon {
    id: String,
}

/// Promotion code object (only the fields we read).
#[derive(Deserialize)]
struct StripePromotionCode {
    id: String,
    code: String,
}

/// Maps a non-success response to an [`ApiError`].
fn classify_error(status: StatusCode, body: &str) -> ApiError {
    let detail = serde_json::from_str::<StripeError>(body).ok().map(|e| e.error);
    let rate_limit_code =
        detail.as_ref().and_then(|d| d.code.as_deref()).is_some_and(|c| c == "rate_limit");
    let message = detail.and_then(|d| d.message).unwrap_or_else(|| body.to_string());

    if status == StatusCode::TOO_MANY_REQUESTS || rate_limit_code {
        ApiError::RateLimited(message)
    } else {
        ApiError::Rejected { status: status.as_u16(), message }
    }
}

fn push_metadata(
    form: &mut Vec<(String, String)>,
    metadata: &std::collections::BTreeMap<String, String>,
) {
    for (key, value) in metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }
}

/// Form fields for `POST /v1/coupons`.
fn coupon_form(request: &CouponRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("name".to_string(), request.name.clone()),
        ("duration".to_string(), request.duration.as_str().to_string()),
    ];
    if let crate::campaign::DurationPolicy::Repeating { months } = request.duration {
        form.push(("duration_in_months".to_string(), months.to_string()));
    }
    match &request.discount {
        Discount::PercentOff(percent) => {
            form.push(("percent_off".to_string(), percent.to_string()));
        }
        Discount::AmountOff { minor_units, currency } => {
            form.push(("amount_off".to_string(), minor_units.to_string()));
            form.push(("currency".to_string(), currency.to_lowercase()));
        }
    }
    push_metadata(&mut form, &request.metadata);
    form
}

/// Form fields for `POST /v1/promotion_codes`.
fn promotion_code_form(request: &PromotionCodeRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("coupon".to_string(), request.coupon_id.clone()),
        ("max_redemptions".to_string(), request.max_redemptions.to_string()),
        ("expires_at".to_string(), request.expires_at.timestamp().to_string()),
    ];
    if let Some(code) = &request.code {
        form.push(("code".to_string(), code.clone()));
    }
    push_metadata(&mut form, &request.metadata);
    form
}

impl PaymentsApi for StripeClient {
    fn create_coupon(&self, request: &CouponRequest) -> PaymentsFuture<'_, CreatedCoupon> {
        let form = coupon_form(request);
        Box::pin(async move {
            let coupon: StripeCoupon = self.post_form("/v1/coupons", form, None).await?;
            Ok(CreatedCoupon { id: coupon.id })
        })
    }

    fn create_promotion_code(
        &self,
        request: &PromotionCodeRequest,
    ) -> PaymentsFuture<'_, IssuedCode> {
        let form = promotion_code_form(request);
        let idempotency_key = request.idempotency_key.clone();
        Box::pin(async move {
            let promo: StripePromotionCode =
                self.post_form("/v1/promotion_codes", form, Some(idempotency_key)).await?;
            Ok(IssuedCode { id: promo.id, code: promo.code })
        })
    }
}
