//! Validated run configuration.
//!
//! [`GenerateArgs`] is what the user typed; [`RunConfig`] is what a run is
//! allowed to start with. Everything is checked here, before any remote call.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::campaign::{CampaignSpec, Discount, DurationPolicy, TargetRestriction};
use crate::cli::{DurationArg, GenerateArgs};
use crate::error::ConfigError;
use crate::issuer::RetryPolicy;
use crate::scheduler::ScheduleConfig;
use crate::sink::SinkConfig;

const DEFAULT_PERCENT_OFF: u8 = 25;

/// Which provider the run talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    /// The real API.
    Live {
        /// Secret key.
        api_key: String,
        /// API base URL.
        base_url: String,
    },
    /// The in-process simulator (`--dry-run`).
    Simulated,
}

/// How code strings are chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeMode {
    /// The provider assigns each code.
    Auto,
    /// Codes are generated locally and sent with the request.
    Explicit {
        /// Fixed prefix.
        prefix: String,
        /// Random characters after the prefix.
        length: usize,
    },
}

/// Everything a run needs, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Provider selection and credentials.
    pub provider: Provider,
    /// Campaign to create (or describe, with `coupon_id`).
    pub campaign: CampaignSpec,
    /// Existing coupon to reuse.
    pub coupon_id: Option<String>,
    /// Code selection mode.
    pub code_mode: CodeMode,
    /// Batch sizes and pacing.
    pub schedule: ScheduleConfig,
    /// Rate-limit retry policy.
    pub retry: RetryPolicy,
    /// Output location and rotation.
    pub output: SinkConfig,
    /// Progress milestone interval.
    pub milestone_every: u64,
}

impl RunConfig {
    /// Validates `args`, using `now` to check the expiry date.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn from_args(args: GenerateArgs, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let provider = if args.dry_run {
            Provider::Simulated
        } else {
            match args.api_key.filter(|key| !key.trim().is_empty()) {
                Some(api_key) => Provider::Live { api_key, base_url: args.api_base },
                None => return Err(ConfigError::MissingApiKey),
            }
        };

        non_zero(args.total, "--total")?;
        non_zero(args.workers as u64, "--workers")?;
        non_zero(args.batch_size, "--batch-size")?;
        non_zero(args.file_capacity, "--file-capacity")?;
        non_zero(u64::from(args.max_attempts), "--max-attempts")?;

        let code_mode = match args.code_length {
            None => CodeMode::Auto,
            Some(0) => return Err(ConfigError::Zero("--code-length")),
            Some(length) => {
                CodeMode::Explicit { prefix: args.code_prefix.unwrap_or_default(), length }
            }
        };

        let discount = match (args.percent_off, args.amount_off) {
            (_, Some(0)) => return Err(ConfigError::Zero("--amount-off")),
            (None, Some(minor_units)) => {
                let currency = args
                    .currency
                    .filter(|c| !c.trim().is_empty())
                    .ok_or(ConfigError::MissingCurrency)?;
                Discount::AmountOff { minor_units, currency }
            }
            (Some(percent), _) if percent == 0 || percent > 100 => {
                return Err(ConfigError::PercentOutOfRange(percent));
            }
            (Some(percent), _) => Discount::PercentOff(percent),
            (None, None) => Discount::PercentOff(DEFAULT_PERCENT_OFF),
        };

        let duration = match args.duration {
            DurationArg::Once => DurationPolicy::Once,
            DurationArg::Forever => DurationPolicy::Forever,
            DurationArg::Repeating => match args.duration_months {
                Some(months) if months > 0 => DurationPolicy::Repeating { months },
                Some(_) => return Err(ConfigError::Zero("--duration-months")),
                None => return Err(ConfigError::MissingDurationMonths),
            },
        };

        let campaign = CampaignSpec {
            name: args.campaign_name,
            discount,
            duration,
            expires_at: CampaignSpec::expiry_from_date(args.expires_on, now)?,
            target: TargetRestriction { price_id: args.price_id, product_id: args.product_id },
        };

        Ok(Self {
            provider,
            campaign,
            coupon_id: args.coupon_id,
            code_mode,
            schedule: ScheduleConfig {
                total: args.total,
                workers: args.workers,
                batch_size: args.batch_size,
                cooldown: Duration::from_millis(args.cooldown_ms),
            },
            retry: RetryPolicy {
                max_attempts: args.max_attempts,
                backoff_unit: Duration::from_millis(args.backoff_ms),
            },
            output: SinkConfig {
                dir: args.output_dir,
                capacity: args.file_capacity,
                header: !args.no_header,
            },
            milestone_every: args.milestone_every,
        })
    }
}

fn non_zero(value: u64, name: &'static str) -> Result<(), ConfigError> {
    if value == 0 {
        Err(ConfigError::Zero(name))
    } else {
        Ok(())
    }
}
