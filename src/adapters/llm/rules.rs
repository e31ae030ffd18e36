//! Offline advisor: fixed recommendations tailored by key factors.

use super::prompt::default_recommendations;
use crate::domain::KeyFactor;
use crate::ports::{AdviceError, AdviceGenerator, RiskSummary};

/// Advice generator used when no LLM API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleBasedAdvisor;

impl AdviceGenerator for RuleBasedAdvisor {
    fn generate(&self, _summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        Ok(default_recommendations(key_factors))
    }
}
