//! Service context bundling the port trait objects a run depends on.

use std::sync::Arc;

use crate::adapters::live::clock::LiveClock;
use crate::adapters::live::code_gen::RandomCodeGenerator;
use crate::adapters::live::stripe::StripeClient;
use crate::adapters::simulated::SimulatedPayments;
use crate::config::{CodeMode, Provider, RunConfig};
use crate::error::ApiError;
use crate::ports::{Clock, CodeGenerator, PaymentsApi};

/// Bundles the ports into a single context.
///
/// Constructors wire up different adapter implementations: live for real
/// runs, simulated for `--dry-run`, anything at all for tests.
#[derive(Clone)]
pub struct ServiceContext {
    /// Clock used for timestamps, backoff and cooldown.
    pub clock: Arc<dyn Clock>,
    /// Payments provider.
    pub payments: Arc<dyn PaymentsApi>,
    /// Explicit code source; `None` lets the provider assign codes.
    pub codes: Option<Arc<dyn CodeGenerator>>,
}

impl ServiceContext {
    /// Wires adapters from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &RunConfig) -> Result<Self, ApiError> {
        let payments: Arc<dyn PaymentsApi> = match &config.provider {
            Provider::Live { api_key, base_url } => {
                Arc::new(StripeClient::new(api_key.clone(), base_url)?)
            }
            Provider::Simulated => Arc::new(SimulatedPayments::new()),
        };
        Ok(Self::new(Arc::new(LiveClock), payments, code_generator(&config.code_mode)))
    }

    /// Builds a context from explicit parts.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        payments: Arc<dyn PaymentsApi>,
        codes: Option<Arc<dyn CodeGenerator>>,
    ) -> Self {
        Self { clock, payments, codes }
    }
}

fn code_generator(mode: &CodeMode) -> Option<Arc<dyn CodeGenerator>> {
    match mode {
        CodeMode::Auto => None,
        CodeMode::Explicit { prefix, length } => {
            Some(Arc::new(RandomCodeGenerator::new(prefix.clone(), *length)))
        }
    }
}
