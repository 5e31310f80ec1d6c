//! The parent discount every generated code redeems against.
//!
//! A [`Campaign`] is created exactly once at startup, either by asking the
//! provider to create it ([`Campaign::establish`]) or by adopting an existing
//! identifier ([`Campaign::existing`]). It is shared read-only afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::error::{ApiError, ConfigError};
use crate::ports::payments::{CouponRequest, PaymentsApi, PromotionCodeRequest};

/// Shape of the discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discount {
    /// Whole-number percentage off, `1..=100`.
    PercentOff(u8),
    /// Fixed amount off, in the currency's minor units.
    AmountOff {
        /// Amount in minor units (cents, pence).
        minor_units: u64,
        /// ISO currency code.
        currency: String,
    },
}

/// How long a redeemed discount keeps applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationPolicy {
    /// Applies to a single payment.
    Once,
    /// Applies indefinitely.
    Forever,
    /// Applies for a fixed number of months.
    Repeating {
        /// Number of months.
        months: u32,
    },
}

impl DurationPolicy {
    /// Provider wire name of the policy.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Forever => "forever",
            Self::Repeating { .. } => "repeating",
        }
    }
}

/// Product and price the codes are meant for, recorded as metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRestriction {
    /// Intended price identifier.
    pub price_id: Option<String>,
    /// Intended product identifier.
    pub product_id: Option<String>,
}

impl TargetRestriction {
    /// Metadata attached to every redemption code.
    #[must_use]
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        if let Some(price) = &self.price_id {
            metadata.insert("intended_price".to_string(), price.clone());
        }
        if let Some(product) = &self.product_id {
            metadata.insert("intended_product".to_string(), product.clone());
        }
        metadata
    }
}

/// Everything needed to create or describe a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignSpec {
    /// Display name, also used for output file names.
    pub name: String,
    /// Discount shape.
    pub discount: Discount,
    /// Duration policy.
    pub duration: DurationPolicy,
    /// Instant after which codes can no longer be redeemed.
    pub expires_at: DateTime<Utc>,
    /// Optional product/price restriction metadata.
    pub target: TargetRestriction,
}

impl CampaignSpec {
    /// Converts an expiry date into the last second of that day, UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidExpiry`] if the date has no such second
    /// and [`ConfigError::ExpiryInPast`] if it is not after `now`.
    pub fn expiry_from_date(
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ConfigError> {
        let expires_at = date
            .and_hms_opt(23, 59, 59)
            .ok_or_else(|| ConfigError::InvalidExpiry(date.to_string()))?
            .and_utc();
        if expires_at <= now {
            return Err(ConfigError::ExpiryInPast(date.to_string()));
        }
        Ok(expires_at)
    }

    /// File-name-safe form of the campaign name.
    #[must_use]
    pub fn file_stem(&self) -> String {
        sanitize_name(&self.name)
    }
}

/// An established campaign: the spec plus the provider's identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Campaign {
    id: String,
    spec: CampaignSpec,
}

impl Campaign {
    /// Creates the parent discount on the provider.
    ///
    /// # Errors
    ///
    /// Returns the provider error unchanged; callers treat it as fatal.
    pub async fn establish(api: &dyn PaymentsApi, spec: CampaignSpec) -> Result<Self, ApiError> {
        let request = CouponRequest {
            name: spec.name.clone(),
            discount: spec.discount.clone(),
            duration: spec.duration,
            metadata: spec.target.metadata(),
        };
        let created = api.create_coupon(&request).await?;
        info!(coupon = %created.id, name = %spec.name, "campaign created");
        Ok(Self { id: created.id, spec })
    }

    /// Adopts a campaign that already exists on the provider.
    #[must_use]
    pub fn existing(id: impl Into<String>, spec: CampaignSpec) -> Self {
        Self { id: id.into(), spec }
    }

    /// Provider identifier of the parent discount.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The spec this campaign was built from.
    #[must_use]
    pub fn spec(&self) -> &CampaignSpec {
        &self.spec
    }

    /// Builds the single-use redemption code request for this campaign.
    #[must_use]
    pub fn promotion_code_request(
        &self,
        code: Option<String>,
        idempotency_key: String,
    ) -> PromotionCodeRequest {
        PromotionCodeRequest {
            coupon_id: self.id.clone(),
            max_redemptions: 1,
            expires_at: self.spec.expires_at,
            code,
            metadata: self.spec.target.metadata(),
            idempotency_key,
        }
    }

    /// Expiry rendered as `DD/MM/YYYY`.
    #[must_use]
    pub fn expiry_display(&self) -> String {
        self.spec.expires_at.format("%d/%m/%Y").to_string()
    }

    /// Human-readable summary such as `25% off once`.
    #[must_use]
    pub fn offer_description(&self) -> String {
        let amount = match &self.spec.discount {
            Discount::PercentOff(percent) => format!("{percent}%"),
            Discount::AmountOff { minor_units, currency } => format!(
                "{}.{:02} {}",
                minor_units / 100,
                minor_units % 100,
                currency.to_uppercase()
            ),
        };
        match self.spec.duration {
            DurationPolicy::Once => format!("{amount} off once"),
            DurationPolicy::Forever => format!("{amount} off forever"),
            DurationPolicy::Repeating { months: 1 } => format!("{amount} off for 1 month"),
            DurationPolicy::Repeating { months } => format!("{amount} off for {months} months"),
        }
    }

    /// File-name-safe form of the campaign name.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.spec.file_stem()
    }
}

/// Lowercases ASCII alphanumerics and collapses everything else into `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            stem.push(ch.to_ascii_lowercase());
        } else if !stem.is_empty() && !stem.ends_with('_') {
            stem.push('_');
        }
    }
    let stem = stem.trim_end_matches('_');
    if stem.is_empty() {
        "campaign".to_string()
    } else {
        stem.to_string()
    }
}
