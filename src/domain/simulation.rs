//! What-if plan types and lifestyle deltas.

use serde::{Deserialize, Serialize};

use super::features::{compute_bmi, LifestyleFeatures};
use super::fusion::RiskCategory;

const KG_PER_LB: f64 = 0.453_592_37;
const DAYS_PER_WEEK: f64 = 7.0;
const MAX_DIET_QUALITY: f64 = 10.0;
const MAX_SLEEP_HOURS: f64 = 9.0;
const MAX_ACTIVITY_MINUTES: f64 = 5040.0;
const BMI_RANGE: (f64, f64) = (10.0, 80.0);

/// Intervention plan category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    WeightLoss,
    Exercise,
    Diet,
    Sleep,
    SmokingCessation,
    Combined,
}

impl PlanType {
    pub const ALL: [PlanType; 6] = [
        Self::WeightLoss,
        Self::Exercise,
        Self::Diet,
        Self::Sleep,
        Self::SmokingCessation,
        Self::Combined,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WeightLoss => "weight_loss",
            Self::Exercise => "exercise",
            Self::Diet => "diet",
            Self::Sleep => "sleep",
            Self::SmokingCessation => "smoking_cessation",
            Self::Combined => "combined",
        }
    }

    /// Concrete steps shown next to each scenario of this plan.
    #[must_use]
    pub fn action_items(&self) -> &'static [&'static str] {
        match self {
            Self::WeightLoss => &[
                "Create a caloric deficit of 500 calories/day",
                "Combine dietary changes with increased physical activity",
                "Set realistic goal of 1-2 lbs weight loss per week",
            ],
            Self::Exercise => &[
                "Start with 30 minutes of brisk walking 5 days/week",
                "Gradually increase intensity (cycling, swimming, jogging)",
                "Include strength training 2 days/week",
            ],
            Self::Diet => &[
                "Adopt a Mediterranean-style eating pattern",
                "Replace refined carbohydrates with whole grains",
                "Limit sugary drinks and processed foods",
            ],
            Self::Sleep => &[
                "Establish consistent sleep schedule (same bedtime/wake time)",
                "Limit screen time 1 hour before bed",
                "Optimize sleep environment (dark, cool, quiet)",
            ],
            Self::SmokingCessation => &[
                "Set a quit date within the next 2 weeks",
                "Talk to a healthcare provider about cessation aids",
                "Identify and avoid smoking triggers",
            ],
            Self::Combined => &[
                "Focus on one change per week and build on it",
                "Track weight, activity and meals together",
                "Review progress with a healthcare provider monthly",
            ],
        }
    }

    /// Typical time for the plan's effect to show.
    #[must_use]
    pub fn timeframe(&self) -> &'static str {
        match self {
            Self::WeightLoss => "3-6 months",
            Self::Exercise => "2-3 months",
            Self::Diet => "3-4 months",
            Self::Sleep => "1-2 months",
            Self::SmokingCessation | Self::Combined => "6-12 months",
        }
    }

    /// The fixed deltas for this plan, in increasing intensity.
    #[must_use]
    pub fn ladder(&self) -> Vec<LifestyleDelta> {
        match self {
            Self::WeightLoss => [5.0, 10.0, 20.0]
                .into_iter()
                .map(LifestyleDelta::lose_pounds)
                .collect(),
            Self::Exercise => [15.0, 30.0, 60.0]
                .into_iter()
                .map(LifestyleDelta::more_daily_activity)
                .collect(),
            Self::Diet => [1.0, 2.0, 4.0]
                .into_iter()
                .map(|d| LifestyleDelta {
                    diet_quality_change: Some(d),
                    ..Default::default()
                })
                .collect(),
            Self::Sleep => [0.5, 1.0, 1.5]
                .into_iter()
                .map(|h| LifestyleDelta {
                    sleep_change_hours: Some(h),
                    ..Default::default()
                })
                .collect(),
            Self::SmokingCessation => vec![LifestyleDelta {
                quit_smoking: true,
                ..Default::default()
            }],
            Self::Combined => [(5.0, 15.0, 1.0), (10.0, 30.0, 2.0), (20.0, 60.0, 4.0)]
                .into_iter()
                .map(|(lb, min, diet)| LifestyleDelta {
                    diet_quality_change: Some(diet),
                    ..LifestyleDelta::lose_pounds(lb).merge(&LifestyleDelta::more_daily_activity(min))
                })
                .collect(),
        }
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown plan type '{s}'"))
    }
}

impl std::fmt::Display for PlanType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial change to a lifestyle record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifestyleDelta {
    /// Negative for weight loss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_change_kg: Option<f64>,
    /// Minutes per week
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_change_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diet_quality_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep_change_hours: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub quit_smoking: bool,
}

impl LifestyleDelta {
    fn lose_pounds(lb: f64) -> Self {
        Self {
            weight_change_kg: Some(-round2(lb * KG_PER_LB)),
            ..Default::default()
        }
    }

    fn more_daily_activity(minutes_per_day: f64) -> Self {
        Self {
            activity_change_minutes: Some(minutes_per_day * DAYS_PER_WEEK),
            ..Default::default()
        }
    }

    fn merge(&self, other: &Self) -> Self {
        Self {
            weight_change_kg: self.weight_change_kg.or(other.weight_change_kg),
            activity_change_minutes: self.activity_change_minutes.or(other.activity_change_minutes),
            diet_quality_change: self.diet_quality_change.or(other.diet_quality_change),
            sleep_change_hours: self.sleep_change_hours.or(other.sleep_change_hours),
            quit_smoking: self.quit_smoking || other.quit_smoking,
        }
    }

    /// Apply to a copy of `baseline`.
    ///
    /// A supplied BMI is recomputed when the weight changes and clamped to
    /// [10, 80]. Other values are clamped to plausible ranges, and fields the baseline lacks get a
    /// neutral starting point (diet quality 5, activity 0).
    #[must_use]
    pub fn apply(&self, baseline: &LifestyleFeatures) -> LifestyleFeatures {
        let mut out = baseline.clone();

        if let Some(dw) = self.weight_change_kg {
            if let Some(w) = out.weight_kg {
                let new_weight = (w + dw).max(20.0);
                out.weight_kg = Some(new_weight);
                // An absent BMI stays absent and is derived from height and weight.
                out.bmi = out.bmi.map(|b| {
                    let projected = match out.height_cm {
                        Some(h) if h > 0.0 => compute_bmi(h, new_weight),
                        _ => b * new_weight / w,
                    };
                    projected.clamp(BMI_RANGE.0, BMI_RANGE.1)
                });
            }
        }
        if let Some(dm) = self.activity_change_minutes {
            let current = out.physical_activity.unwrap_or(0.0);
            out.physical_activity = Some((current + dm).clamp(0.0, MAX_ACTIVITY_MINUTES));
        }
        if let Some(dd) = self.diet_quality_change {
            let current = out.diet_quality.unwrap_or(5.0);
            out.diet_quality = Some((current + dd).clamp(0.0, MAX_DIET_QUALITY));
        }
        if let Some(ds) = self.sleep_change_hours {
            if let Some(current) = out.sleep_hours {
                // Never push sleep past the cap, and never shorten it either.
                out.sleep_hours = Some((current + ds).min(MAX_SLEEP_HOURS).max(current));
            }
        }
        if self.quit_smoking {
            out.smoking = Some(false);
        }

        out
    }

    /// Short human label, e.g. "Lose 4.54 kg, +210 min/week activity".
    #[must_use]
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(dw) = self.weight_change_kg {
            if dw < 0.0 {
                parts.push(format!("Lose {:.2} kg", -dw));
            } else {
                parts.push(format!("Gain {dw:.2} kg"));
            }
        }
        if let Some(dm) = self.activity_change_minutes {
            parts.push(format!("+{:.0} min/day activity", dm / DAYS_PER_WEEK));
        }
        if let Some(dd) = self.diet_quality_change {
            parts.push(format!("Diet quality +{dd:.0}"));
        }
        if let Some(ds) = self.sleep_change_hours {
            parts.push(format!("+{ds:.1} h sleep"));
        }
        if self.quit_smoking {
            parts.push("Quit smoking".to_string());
        }
        if parts.is_empty() {
            "No change".to_string()
        } else {
            parts.join(", ")
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Projected outcome of one delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationScenario {
    pub label: String,
    pub plan: PlanType,
    pub parameter_delta: LifestyleDelta,
    pub projected_lifestyle_risk: f64,
    pub projected_risk: f64,
    pub projected_category: RiskCategory,
    /// (baseline - projected) / baseline * 100, never negative
    pub risk_reduction_percent: f64,
    #[serde(default)]
    pub timeframe: String,
    pub action_items: Vec<String>,
}

/// Relative reduction in percent, clamped at 0.
#[must_use]
pub fn risk_reduction_percent(baseline: f64, projected: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    ((baseline - projected) / baseline * 100.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::sample_features;

    #[test]
    fn test_weight_ladder() {
        let ladder = PlanType::WeightLoss.ladder();
        let kg: Vec<_> = ladder.iter().filter_map(|d| d.weight_change_kg).collect();
        assert_eq!(kg, vec![-2.27, -4.54, -9.07]);
    }

    #[test]
    fn test_exercise_ladder_is_weekly() {
        let ladder = PlanType::Exercise.ladder();
        let minutes: Vec<_> = ladder
            .iter()
            .filter_map(|d| d.activity_change_minutes)
            .collect();
        assert_eq!(minutes, vec![105.0, 210.0, 420.0]);
        assert_eq!(ladder[0].label(), "+15 min/day activity");
    }

    #[test]
    fn test_combined_ladder_mixes_deltas() {
        let ladder = PlanType::Combined.ladder();
        assert_eq!(ladder.len(), 3);
        assert_eq!(ladder[1].weight_change_kg, Some(-4.54));
        assert_eq!(ladder[1].activity_change_minutes, Some(210.0));
        assert_eq!(ladder[1].diet_quality_change, Some(2.0));
    }

    #[test]
    fn test_apply_recomputes_bmi_and_leaves_baseline() {
        let baseline = sample_features().with_derived_bmi();
        let delta = LifestyleDelta {
            weight_change_kg: Some(-9.07),
            ..Default::default()
        };

        let out = delta.apply(&baseline);
        assert_eq!(baseline.weight_kg, Some(98.0));
        assert!((out.weight_kg.expect("weight") - 88.93).abs() < 1e-9);
        let expected = compute_bmi(175.0, 88.93);
        assert!((out.bmi.expect("bmi") - expected).abs() < 1e-9);
    }

    #[test]
    fn test_apply_keeps_bmi_derived_when_not_supplied() {
        let baseline = LifestyleFeatures {
            height_cm: Some(200.0),
            weight_kg: Some(45.0),
            ..sample_features()
        };
        let out = PlanType::WeightLoss.ladder()[2].apply(&baseline);
        assert_eq!(out.bmi, None);
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_apply_clamps_supplied_bmi() {
        let baseline = LifestyleFeatures {
            height_cm: Some(200.0),
            weight_kg: Some(45.0),
            bmi: Some(11.25),
            ..sample_features()
        };
        let out = PlanType::WeightLoss.ladder()[2].apply(&baseline);
        assert_eq!(out.bmi, Some(10.0));
        assert!(out.validate().is_ok());
    }

    #[test]
    fn test_apply_clamps() {
        let mut baseline = sample_features();
        baseline.diet_quality = Some(9.0);
        baseline.sleep_hours = Some(8.8);
        let delta = LifestyleDelta {
            diet_quality_change: Some(4.0),
            sleep_change_hours: Some(1.5),
            quit_smoking: true,
            ..Default::default()
        };

        let out = delta.apply(&baseline);
        assert_eq!(out.diet_quality, Some(10.0));
        assert_eq!(out.sleep_hours, Some(9.0));
        assert_eq!(out.smoking, Some(false));
    }

    #[test]
    fn test_risk_reduction_percent() {
        assert!((risk_reduction_percent(0.4, 0.3) - 25.0).abs() < 1e-9);
        assert_eq!(risk_reduction_percent(0.3, 0.4), 0.0);
        assert_eq!(risk_reduction_percent(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_timeframes() {
        assert_eq!(PlanType::Sleep.timeframe(), "1-2 months");
        assert_eq!(PlanType::Combined.timeframe(), "6-12 months");
    }

    #[test]
    fn test_plan_type_parse() {
        assert_eq!("smoking_cessation".parse::<PlanType>(), Ok(PlanType::SmokingCessation));
        assert!("yoga".parse::<PlanType>().is_err());
    }
}
