//! What-if scenario generation.
//!
//! Each rung of a plan's ladder is applied to a copy of the baseline record
//! and re-scored with the lifestyle model and the fusion weights.

use std::sync::Arc;

use crate::domain::{
    combine, risk_reduction_percent, FusionWeights, LifestyleFeatures, PlanType, RiskCategory,
    SimulationScenario,
};
use crate::ports::LifestylePredictor;
use crate::GlycofuseError;

/// Projects risk under fixed lifestyle interventions.
///
/// Deterministic for a deterministic predictor: the same baseline, plan and
/// retinal risk always produce the same scenarios, in ladder order.
pub struct ScenarioGenerator {
    lifestyle: Arc<dyn LifestylePredictor>,
    weights: FusionWeights,
}

impl ScenarioGenerator {
    #[must_use]
    pub fn new(lifestyle: Arc<dyn LifestylePredictor>, weights: FusionWeights) -> Self {
        Self { lifestyle, weights }
    }

    /// Fused risk of `features` at a fixed retinal risk.
    fn fused_risk(&self, features: &LifestyleFeatures, retinal_risk: f64) -> crate::Result<(f64, f64)> {
        let lifestyle = self.lifestyle.predict(features)?;
        let combined = combine(retinal_risk, lifestyle.risk_score, &self.weights)?;
        Ok((lifestyle.risk_score, combined))
    }

    /// Generate scenarios for one plan.
    ///
    /// The baseline is never mutated. Reductions are relative to the fused
    /// risk of the baseline itself.
    ///
    /// # Errors
    /// Returns `Validation` if the baseline is incomplete, or any error of the
    /// lifestyle model or fusion step on a projected record.
    pub fn generate_scenarios(
        &self,
        baseline: &LifestyleFeatures,
        plan: PlanType,
        retinal_risk: f64,
    ) -> crate::Result<Vec<SimulationScenario>> {
        let (_, baseline_risk) = self.fused_risk(baseline, retinal_risk)?;
        tracing::debug!(
            "Simulating {} plan from baseline risk {:.4}",
            plan,
            baseline_risk
        );

        plan.ladder()
            .into_iter()
            .map(|delta| {
                let projected = delta.apply(baseline);
                let (projected_lifestyle_risk, projected_risk) =
                    self.fused_risk(&projected, retinal_risk)?;
                Ok(SimulationScenario {
                    label: delta.label(),
                    plan,
                    projected_lifestyle_risk,
                    projected_risk,
                    projected_category: RiskCategory::from_score(projected_risk),
                    risk_reduction_percent: risk_reduction_percent(baseline_risk, projected_risk),
                    timeframe: plan.timeframe().to_string(),
                    action_items: plan.action_items().iter().map(ToString::to_string).collect(),
                    parameter_delta: delta,
                })
            })
            .collect::<Result<Vec<_>, GlycofuseError>>()
    }

    /// Generate scenarios for every plan type, in `PlanType::ALL` order.
    ///
    /// # Errors
    /// Same as [`Self::generate_scenarios`].
    pub fn generate_all(
        &self,
        baseline: &LifestyleFeatures,
        retinal_risk: f64,
    ) -> crate::Result<Vec<SimulationScenario>> {
        let mut out = Vec::new();
        for plan in PlanType::ALL {
            out.extend(self.generate_scenarios(baseline, plan, retinal_risk)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::LinearLifestyle;
    use crate::domain::sample_features;

    fn generator() -> ScenarioGenerator {
        ScenarioGenerator::new(
            Arc::new(LinearLifestyle::default()),
            FusionWeights::new(0.103, 0.897).expect("Should be valid"),
        )
    }

    #[test]
    fn test_scenarios_follow_ladder_order() {
        let scenarios = generator()
            .generate_scenarios(&sample_features(), PlanType::WeightLoss, 0.2)
            .expect("Should simulate");
        assert_eq!(scenarios.len(), 3);
        let kg: Vec<_> = scenarios
            .iter()
            .filter_map(|s| s.parameter_delta.weight_change_kg)
            .collect();
        assert_eq!(kg, vec![-2.27, -4.54, -9.07]);
        // More weight loss means more reduction for this model.
        assert!(scenarios[0].risk_reduction_percent < scenarios[1].risk_reduction_percent);
        assert!(scenarios[1].risk_reduction_percent < scenarios[2].risk_reduction_percent);
        assert!(scenarios.iter().all(|s| s.plan == PlanType::WeightLoss));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let g = generator();
        let baseline = sample_features();
        let first = g
            .generate_scenarios(&baseline, PlanType::Combined, 0.4)
            .expect("Should simulate");
        let second = g
            .generate_scenarios(&baseline, PlanType::Combined, 0.4)
            .expect("Should simulate");
        assert_eq!(first, second);
        assert_eq!(baseline, sample_features());
    }

    #[test]
    fn test_reduction_never_negative() {
        let all = generator()
            .generate_all(&sample_features(), 0.9)
            .expect("Should simulate");
        assert_eq!(all.len(), 3 + 3 + 3 + 3 + 1 + 3);
        assert!(all.iter().all(|s| s.risk_reduction_percent >= 0.0));
        assert!(all.iter().all(|s| (0.0..=1.0).contains(&s.projected_risk)));
    }

    #[test]
    fn test_light_baseline_simulates_every_plan() {
        let baseline = LifestyleFeatures {
            age: Some(30.0),
            height_cm: Some(200.0),
            weight_kg: Some(45.0),
            bmi: None,
            physical_activity: Some(100.0),
            sleep_hours: Some(7.0),
            ..sample_features()
        };
        assert!(baseline.validate().is_ok());

        let g = generator();
        let weight_loss = g
            .generate_scenarios(&baseline, PlanType::WeightLoss, 0.0)
            .expect("Should simulate weight loss");
        assert_eq!(weight_loss.len(), 3);
        assert!(weight_loss.iter().all(|s| s.timeframe == "3-6 months"));

        let all = g.generate_all(&baseline, 0.0).expect("Should simulate all plans");
        let expected: usize = PlanType::ALL.iter().map(|p| p.ladder().len()).sum();
        assert_eq!(all.len(), expected);
    }

    #[test]
    fn test_incomplete_baseline_is_rejected() {
        let baseline = LifestyleFeatures {
            age: None,
            ..sample_features()
        };
        let err = generator()
            .generate_scenarios(&baseline, PlanType::Diet, 0.0)
            .expect_err("Should reject");
        assert!(err.is_client_error());
    }
}
