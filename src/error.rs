//! Error types for each boundary of a run.
//!
//! Remote failures are classified once, at the adapter, so the retry logic in
//! [`crate::issuer`] only has to ask [`ApiError::is_rate_limit`].

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by the payments API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The provider throttled the request. The only retryable class.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// The provider refused the request (validation, auth, duplicate code, ...).
    #[error("request rejected ({status}): {message}")]
    Rejected {
        /// HTTP status returned by the provider.
        status: u16,
        /// Provider-supplied message, or the raw body when it was not JSON.
        message: String,
    },
    /// The request never produced a response.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The provider answered with a body we could not interpret.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns `true` when the failure is transient and worth retrying.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Failure while writing generated codes to disk.
#[derive(Debug, Error)]
pub enum SinkError {
    /// An output file could not be created.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// The file that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A row could not be encoded or written.
    #[error("failed to write row: {0}")]
    Write(#[from] csv::Error),
    /// Buffered rows could not be flushed.
    #[error("failed to flush output: {0}")]
    Flush(#[from] std::io::Error),
    /// A worker panicked while holding the sink lock.
    #[error("output sink lock poisoned")]
    Poisoned,
    /// The sink was written to after finalization.
    #[error("output sink already closed")]
    Closed,
}

/// Invalid run configuration, detected before any remote call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A count or size that must be positive was zero.
    #[error("{0} must be greater than 0")]
    Zero(&'static str),
    /// Percentage outside `1..=100`.
    #[error("percent off must be between 1 and 100, got {0}")]
    PercentOutOfRange(u8),
    /// `--amount-off` given without a currency.
    #[error("--amount-off requires --currency")]
    MissingCurrency,
    /// `--duration repeating` given without a month count.
    #[error("--duration repeating requires --duration-months")]
    MissingDurationMonths,
    /// The expiry date is today or in the past.
    #[error("expiry {0} is not in the future")]
    ExpiryInPast(String),
    /// The expiry date cannot be represented as an instant.
    #[error("invalid expiry date {0}")]
    InvalidExpiry(String),
    /// No API key was supplied for a live run.
    #[error("STRIPE_API_KEY is not set (pass --api-key or use --dry-run)")]
    MissingApiKey,
}
