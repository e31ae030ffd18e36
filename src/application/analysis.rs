//! Analysis service: orchestrates one complete risk analysis.
//!
//! This service coordinates:
//! - Retinal and lifestyle inference (concurrently)
//! - Weighted fusion and categorization
//! - Advice generation
//! - Optional what-if simulations
//!
//! Retinal, advice and simulation failures degrade the report instead of
//! failing it. Invalid lifestyle input fails the request before fusion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::simulation::ScenarioGenerator;
use crate::config::DEFAULT_PROCESSING_BUDGET;
use crate::domain::{
    assessment_confidence, combine, uuid_v4, AnalysisReport, AnalysisStatus, FactorSource,
    FusionWeights, KeyFactor, LifestyleFeatures, ModelVersions, PlanType, RetinalPrediction,
    RiskAssessment, RiskCategory, Stage, MAX_KEY_FACTORS,
};
use crate::ports::{AdviceGenerator, LifestylePredictor, RetinalPredictor, RiskSummary};

/// Process-wide collaborators, loaded once and shared read-only.
#[derive(Clone)]
pub struct AnalysisContext {
    pub retinal: Arc<dyn RetinalPredictor>,
    pub lifestyle: Arc<dyn LifestylePredictor>,
    pub advisor: Arc<dyn AdviceGenerator>,
    pub weights: FusionWeights,
    /// Label of the fusion weights artifact, recorded on every report
    pub fusion_version: String,
}

/// Service running the full analysis pipeline.
pub struct AnalysisService {
    ctx: AnalysisContext,
    scenarios: ScenarioGenerator,
    budget: Duration,
}

impl AnalysisService {
    /// Create a new analysis service.
    #[must_use]
    pub fn new(ctx: AnalysisContext) -> Self {
        let scenarios = ScenarioGenerator::new(Arc::clone(&ctx.lifestyle), ctx.weights);
        Self {
            ctx,
            scenarios,
            budget: DEFAULT_PROCESSING_BUDGET,
        }
    }

    /// Override the processing-time budget used for the slow-request warning.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn weights(&self) -> FusionWeights {
        self.ctx.weights
    }

    /// Scenario generator sharing this service's lifestyle model and weights.
    #[must_use]
    pub fn scenario_generator(&self) -> &ScenarioGenerator {
        &self.scenarios
    }

    /// Run the complete pipeline for one request.
    ///
    /// `image` may be absent; the retinal stage then degrades to a neutral
    /// risk of 0.0. `plan` selects a simulation ladder; `None` skips
    /// simulations.
    ///
    /// # Errors
    /// Returns `Validation` for missing or out-of-range lifestyle fields,
    /// `ModelUnavailable` if the lifestyle model cannot run, or `Fusion` if
    /// a model produced a score outside [0, 1].
    pub fn run_complete_analysis(
        &self,
        image: Option<&[u8]>,
        features: &LifestyleFeatures,
        plan: Option<PlanType>,
    ) -> crate::Result<AnalysisReport> {
        let start = Instant::now();
        let mut status = AnalysisStatus::default();

        // Step 1: Retinal and lifestyle inference, joined before fusion
        tracing::debug!("Step 1: Running retinal and lifestyle models");
        let (retinal_outcome, lifestyle_outcome) = std::thread::scope(|s| {
            let retinal = s.spawn(|| image.map(|bytes| self.ctx.retinal.predict(bytes)));
            let lifestyle = self.ctx.lifestyle.predict(features);
            (retinal.join(), lifestyle)
        });

        let lifestyle = match lifestyle_outcome {
            Ok(prediction) => prediction,
            Err(e) => {
                tracing::warn!("Lifestyle stage failed: {}", e);
                return Err(e.into());
            }
        };

        let retinal: Option<RetinalPrediction> = match retinal_outcome {
            Ok(Some(Ok(prediction))) => Some(prediction),
            Ok(Some(Err(e))) => {
                tracing::warn!("Retinal stage degraded: {}", e);
                status.degrade(Stage::Retinal, e.to_string());
                None
            }
            Ok(None) => {
                tracing::debug!("No retinal image supplied");
                status.degrade(Stage::Retinal, "no retinal image supplied");
                None
            }
            Err(_) => {
                tracing::warn!("Retinal worker panicked");
                status.degrade(Stage::Retinal, "retinal model crashed");
                None
            }
        };
        let retinal_risk = retinal.as_ref().map_or(0.0, |r| r.risk_score);

        // Step 2: Fusion
        tracing::debug!("Step 2: Fusing retinal and lifestyle risk");
        let combined_risk = combine(retinal_risk, lifestyle.risk_score, &self.ctx.weights)?;
        let risk_category = RiskCategory::from_score(combined_risk);

        let lifestyle_factors = features.key_factors(&lifestyle.feature_importance);
        let confidence =
            assessment_confidence(combined_risk, retinal.is_some(), lifestyle_factors.len());
        let key_factors = merge_key_factors(retinal.as_ref(), lifestyle_factors);

        let assessment = RiskAssessment {
            retinal_risk,
            lifestyle_risk: lifestyle.risk_score,
            combined_risk,
            risk_category,
            confidence,
            key_factors,
        };
        tracing::info!(
            "Combined risk {:.1}% ({})",
            assessment.combined_percent(),
            risk_category.as_str()
        );

        // Step 3: Advice
        tracing::debug!("Step 3: Generating advice");
        let summary = RiskSummary::new(&assessment, retinal.as_ref(), features);
        let recommendations = match self.ctx.advisor.generate(&summary, &assessment.key_factors) {
            Ok(recs) => recs,
            Err(e) => {
                tracing::warn!("Advice stage degraded: {}", e);
                status.degrade(Stage::Advice, e.to_string());
                Vec::new()
            }
        };

        // Step 4: Simulations
        let scenarios = match plan {
            Some(plan) => {
                tracing::debug!("Step 4: Simulating {} plan", plan);
                match self.scenarios.generate_scenarios(features, plan, retinal_risk) {
                    Ok(scenarios) => scenarios,
                    Err(e) => {
                        tracing::warn!("Simulation stage degraded: {}", e);
                        status.degrade(Stage::Simulation, e.to_string());
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        let retinal_signs = retinal
            .as_ref()
            .is_some_and(|r| r.dr_detected || r.findings.any());
        let elapsed = start.elapsed();
        if elapsed > self.budget {
            tracing::warn!(
                "Analysis took {} ms, over the {} ms budget",
                elapsed.as_millis(),
                self.budget.as_millis()
            );
        }

        Ok(AnalysisReport {
            id: uuid_v4(),
            interpretation: assessment.interpretation(retinal_signs),
            priority: risk_category.priority(),
            recommended_action: risk_category.recommended_action().to_string(),
            prevention_potential: assessment.prevention_potential(),
            model_versions: ModelVersions {
                retinal: retinal
                    .as_ref()
                    .map(|r| r.model_version.clone())
                    .or_else(|| self.ctx.retinal.model_version()),
                lifestyle: lifestyle.model_version.clone(),
                fusion: self.ctx.fusion_version.clone(),
            },
            assessment,
            retinal,
            lifestyle,
            recommendations,
            scenarios,
            status,
            processing_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            created_at: Utc::now(),
        })
    }
}

/// Lifestyle factors plus a retinal factor when DR was detected, ordered by
/// importance and capped at [`MAX_KEY_FACTORS`].
fn merge_key_factors(retinal: Option<&RetinalPrediction>, mut factors: Vec<KeyFactor>) -> Vec<KeyFactor> {
    if let Some(r) = retinal.filter(|r| r.dr_detected) {
        factors.push(KeyFactor {
            name: "Diabetic retinopathy detected".to_string(),
            description: format!(
                "{} retinopathy with {} lesion type(s) found",
                r.severity, r.findings.total_features_detected
            ),
            value: Some(r.dr_probability),
            importance: r.dr_probability,
            modifiable: false,
            source: FactorSource::Retinal,
        });
    }
    factors.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    factors.truncate(MAX_KEY_FACTORS);
    factors
}
