//! Advice port: turns a fused assessment into action items.

use std::time::Duration;

use serde::Serialize;

use crate::domain::{DrSeverity, KeyFactor, LifestyleFeatures, RetinalPrediction, RiskAssessment, RiskCategory};

/// Errors from an advice generator. Never fatal to an analysis.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdviceError {
    #[error("Advice upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Advice upstream failed: {0}")]
    Upstream(String),
}

/// What an advisor is told about the patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub combined_risk: f64,
    pub risk_category: RiskCategory,
    pub retinal_risk: f64,
    pub lifestyle_risk: f64,
    pub dr_severity: Option<DrSeverity>,
    pub age: Option<f64>,
    pub bmi: Option<f64>,
    /// Minutes per week
    pub physical_activity: Option<f64>,
    pub sleep_hours: Option<f64>,
    pub smoking: Option<bool>,
}

impl RiskSummary {
    #[must_use]
    pub fn new(
        assessment: &RiskAssessment,
        retinal: Option<&RetinalPrediction>,
        features: &LifestyleFeatures,
    ) -> Self {
        Self {
            combined_risk: assessment.combined_risk,
            risk_category: assessment.risk_category,
            retinal_risk: assessment.retinal_risk,
            lifestyle_risk: assessment.lifestyle_risk,
            dr_severity: retinal.map(|r| r.severity),
            age: features.age,
            bmi: features.effective_bmi(),
            physical_activity: features.physical_activity,
            sleep_hours: features.sleep_hours,
            smoking: features.smoking,
        }
    }
}

/// Trait for advice generators (LLM-backed or rule-based).
pub trait AdviceGenerator: Send + Sync {
    /// Produce an ordered list of recommendations.
    ///
    /// # Errors
    /// Returns `UpstreamTimeout` or `Upstream` when the backing service fails.
    fn generate(&self, summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError>;
}

impl<A: AdviceGenerator + ?Sized> AdviceGenerator for std::sync::Arc<A> {
    fn generate(&self, summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        (**self).generate(summary, key_factors)
    }
}

impl<A: AdviceGenerator + ?Sized> AdviceGenerator for Box<A> {
    fn generate(&self, summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        (**self).generate(summary, key_factors)
    }
}
