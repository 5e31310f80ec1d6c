//! Issues one redemption code per task, retrying only when throttled.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::campaign::Campaign;
use crate::error::ApiError;
use crate::ports::{Clock, CodeGenerator, PaymentsApi};

/// Bounded exponential backoff for rate-limited requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per task, including the first.
    pub max_attempts: u32,
    /// Base delay; attempt `n` (0-based) waits `2^n` units.
    pub backoff_unit: Duration,
}

impl RetryPolicy {
    /// Delay before retrying after the 0-based `attempt` was throttled.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_unit: Duration::from_secs(1) }
    }
}

/// One unit of work: try to produce a single [`CodeRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchTask {
    /// Position of this task in the whole run, starting at 0.
    pub index: u64,
    /// Attempts made so far.
    pub attempts: u32,
    /// Explicit code to request, or `None` for provider-assigned codes.
    pub code: Option<String>,
    /// Sent with every attempt so a retried request cannot create twice.
    pub idempotency_key: String,
}

/// A code the provider accepted, ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRecord {
    /// The redeemable code string.
    pub code: String,
    /// Expiry as `DD/MM/YYYY`.
    pub expiry: String,
    /// Human-readable offer, e.g. `25% off once`.
    pub offer: String,
}

/// Why a task produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueFailure {
    /// Every attempt was rate limited.
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// The last rate-limit error.
        last: ApiError,
    },
    /// The provider refused the request; not retried.
    Rejected {
        /// Attempts made, including the failing one.
        attempts: u32,
        /// The error returned.
        error: ApiError,
    },
}

impl IssueFailure {
    /// Attempts consumed before giving up.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::RetriesExhausted { attempts, .. } | Self::Rejected { attempts, .. } => *attempts,
        }
    }
}

impl std::fmt::Display for IssueFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} rate-limited attempts: {last}")
            }
            Self::Rejected { attempts, error } => write!(f, "attempt {attempts}: {error}"),
        }
    }
}

/// Wraps the provider call with the retry policy.
pub struct Issuer {
    api: Arc<dyn PaymentsApi>,
    clock: Arc<dyn Clock>,
    codes: Option<Arc<dyn CodeGenerator>>,
    policy: RetryPolicy,
}

impl Issuer {
    /// Creates an issuer. With `codes` set, every task requests an explicit
    /// code; otherwise the provider assigns one.
    #[must_use]
    pub fn new(
        api: Arc<dyn PaymentsApi>,
        clock: Arc<dyn Clock>,
        codes: Option<Arc<dyn CodeGenerator>>,
        policy: RetryPolicy,
    ) -> Self {
        Self { api, clock, codes, policy }
    }

    /// Builds the task for run position `index`.
    ///
    /// The code is generated once here and reused across the task's retries.
    #[must_use]
    pub fn prepare(&self, index: u64) -> BatchTask {
        BatchTask {
            index,
            attempts: 0,
            code: self.codes.as_ref().map(|g| g.generate_code()),
            idempotency_key: Uuid::new_v4().to_string(),
        }
    }

    /// Requests one redemption code for `task`.
    ///
    /// Rate-limit errors sleep `2^attempt` backoff units and retry until
    /// `max_attempts` is reached; the last throttled attempt still sleeps
    /// before giving up. Any other error fails at once.
    ///
    /// # Errors
    ///
    /// Returns an [`IssueFailure`] when no code was created.
    pub async fn issue(
        &self,
        campaign: &Campaign,
        task: &mut BatchTask,
    ) -> Result<CodeRecord, IssueFailure> {
        let request =
            campaign.promotion_code_request(task.code.clone(), task.idempotency_key.clone());

        loop {
            let attempt = task.attempts;
            task.attempts += 1;

            match self.api.create_promotion_code(&request).await {
                Ok(issued) => {
                    debug!(
                        task = task.index,
                        id = %issued.id,
                        attempt = task.attempts,
                        "promotion code created"
                    );
                    return Ok(CodeRecord {
                        code: issued.code,
                        expiry: campaign.expiry_display(),
                        offer: campaign.offer_description(),
                    });
                }
                Err(error) if error.is_rate_limit() => {
                    // Backoff also follows the final attempt; the worker slot stays held.
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        task = task.index,
                        attempt = task.attempts,
                        ?delay,
                        "rate limited, backing off"
                    );
                    self.clock.sleep(delay).await;
                    if task.attempts >= self.policy.max_attempts {
                        warn!(
                            task = task.index,
                            attempts = task.attempts,
                            %error,
                            "retries exhausted"
                        );
                        return Err(IssueFailure::RetriesExhausted {
                            attempts: task.attempts,
                            last: error,
                        });
                    }
                }
                Err(error) => {
                    warn!(
                        task = task.index,
                        attempt = task.attempts,
                        %error,
                        "promotion code request failed"
                    );
                    return Err(IssueFailure::Rejected { attempts: task.attempts, error });
                }
            }
        }
    }
}
