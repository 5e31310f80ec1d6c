//! CLI argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI parser for `promobatch`.
#[derive(Debug, Parser)]
#[command(name = "promobatch", version, about = "Issue batches of single-use promotion codes")]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the campaign and issue promotion codes in batches.
    Generate(GenerateArgs),
    /// Print locally generated codes without contacting the provider.
    Preview {
        /// Number of codes to print.
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Fixed prefix for every code.
        #[arg(long, default_value = "")]
        prefix: String,
        /// Random characters after the prefix.
        #[arg(long, default_value_t = 8)]
        length: usize,
    },
}

/// Duration policy accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DurationArg {
    /// Applies to a single payment.
    Once,
    /// Applies indefinitely.
    Forever,
    /// Applies for `--duration-months` months.
    Repeating,
}

/// Options for `promobatch generate`. Every value is fixed for the run.
#[derive(Debug, Clone, Args)]
pub struct GenerateArgs {
    /// Secret API key.
    #[arg(long, env = "STRIPE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API base URL.
    #[arg(long, env = "STRIPE_API_BASE", default_value = crate::adapters::live::stripe::STRIPE_API_BASE)]
    pub api_base: String,

    /// Simulate the provider in-process instead of calling it.
    #[arg(long)]
    pub dry_run: bool,

    /// Total codes to attempt.
    #[arg(long, env = "PROMOBATCH_TOTAL", default_value_t = 10_000)]
    pub total: u64,

    /// Concurrent requests in flight.
    #[arg(long, env = "PROMOBATCH_WORKERS", default_value_t = 10)]
    pub workers: usize,

    /// Codes attempted per batch before the cooldown.
    #[arg(long, env = "PROMOBATCH_BATCH_SIZE", default_value_t = 400)]
    pub batch_size: u64,

    /// Pause between batches, in milliseconds.
    #[arg(long, default_value_t = 1_000)]
    pub cooldown_ms: u64,

    /// Attempts per code when rate limited.
    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,

    /// Backoff unit in milliseconds; attempt `n` waits `2^n` units.
    #[arg(long, default_value_t = 1_000)]
    pub backoff_ms: u64,

    /// Log a progress line every this many attempted codes.
    #[arg(long, default_value_t = 200)]
    pub milestone_every: u64,

    /// Maximum rows per output file.
    #[arg(long, env = "PROMOBATCH_FILE_CAPACITY", default_value_t = 100_000)]
    pub file_capacity: u64,

    /// Directory for output files.
    #[arg(long, env = "PROMOBATCH_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Omit the header row.
    #[arg(long)]
    pub no_header: bool,

    /// Prefix for explicit codes.
    #[arg(long, requires = "code_length")]
    pub code_prefix: Option<String>,

    /// Generate explicit codes with this many random characters.
    #[arg(long)]
    pub code_length: Option<usize>,

    /// Campaign name.
    #[arg(long, default_value = "Everyday Business")]
    pub campaign_name: String,

    /// Percentage off (default 25 when no amount is given).
    #[arg(long, conflicts_with = "amount_off")]
    pub percent_off: Option<u8>,

    /// Fixed amount off in minor units.
    #[arg(long)]
    pub amount_off: Option<u64>,

    /// Currency for `--amount-off`.
    #[arg(long)]
    pub currency: Option<String>,

    /// Duration policy.
    #[arg(long, value_enum, default_value_t = DurationArg::Once)]
    pub duration: DurationArg,

    /// Months for `--duration repeating`.
    #[arg(long)]
    pub duration_months: Option<u32>,

    /// Last valid day for the codes (YYYY-MM-DD).
    #[arg(long)]
    pub expires_on: NaiveDate,

    /// Intended price, recorded as metadata.
    #[arg(long)]
    pub price_id: Option<String>,

    /// Intended product, recorded as metadata.
    #[arg(long)]
    pub product_id: Option<String>,

    /// Reuse an existing coupon instead of creating one.
    #[arg(long)]
    pub coupon_id: Option<String>,
}
