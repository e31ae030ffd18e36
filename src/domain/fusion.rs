//! Risk fusion: weighted combination of retinal and lifestyle risk.
//!
//! The weights are fitted offline (see `application::weight_training`) and
//! loaded once at startup. Everything in this module is pure.

use serde::{Deserialize, Serialize};

/// Allowed deviation of `w_retinal + w_lifestyle` from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Category boundaries on the 0-1 scale (25 / 50 / 75 percent).
pub const CATEGORY_THRESHOLDS: [f64; 3] = [0.25, 0.50, 0.75];

/// Schema version of the fusion weights artifact.
pub const ARTIFACT_VERSION: u32 = 1;

/// Errors from fusion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    #[error("Invalid fusion input: {0}")]
    InvalidInput(String),

    #[error("Invalid fusion weights: {0}")]
    InvalidWeights(String),
}

/// Fusion weights. Both lie in [0, 1] and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusionWeights {
    retinal: f64,
    lifestyle: f64,
}

impl FusionWeights {
    /// Validate and build a weight pair.
    ///
    /// # Errors
    /// Returns `InvalidWeights` if either weight is non-finite, outside [0, 1],
    /// or the pair does not sum to 1 within `WEIGHT_SUM_TOLERANCE`.
    ///
    /// The lifestyle weight is stored as `1 - retinal`, so the pair sums to 1
    /// exactly.
    pub fn new(retinal: f64, lifestyle: f64) -> Result<Self, FusionError> {
        for (name, w) in [("retinal", retinal), ("lifestyle", lifestyle)] {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(FusionError::InvalidWeights(format!(
                    "{name} weight {w} not in [0, 1]"
                )));
            }
        }
        let sum = retinal + lifestyle;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(FusionError::InvalidWeights(format!(
                "weights sum to {sum}, expected 1.0"
            )));
        }
        Ok(Self {
            retinal,
            lifestyle: 1.0 - retinal,
        })
    }

    /// Equal weighting, used only when no artifact is available.
    #[must_use]
    pub fn equal() -> Self {
        Self {
            retinal: 0.5,
            lifestyle: 0.5,
        }
    }

    #[must_use]
    pub fn retinal(&self) -> f64 {
        self.retinal
    }

    #[must_use]
    pub fn lifestyle(&self) -> f64 {
        self.lifestyle
    }
}

impl<'de> Deserialize<'de> for FusionWeights {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            retinal: f64,
            lifestyle: f64,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.retinal, raw.lifestyle).map_err(serde::de::Error::custom)
    }
}

/// Per-fold outcome of cross-validated weight fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub fold: usize,
    pub retinal_weight: f64,
    pub lifestyle_weight: f64,
    pub train_loss: f64,
    pub validation_loss: f64,
}

/// Cross-validation summary stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub folds: usize,
    pub mean_validation_loss: f64,
    pub retinal_weight_std: f64,
    pub fold_results: Vec<FoldResult>,
}

/// On-disk form of the fusion weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWeightsArtifact {
    pub version: u32,
    pub retinal_weight: f64,
    pub lifestyle_weight: f64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regularization: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_loss: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationSummary>,
}

impl FusionWeightsArtifact {
    /// Validated weights carried by this artifact.
    ///
    /// # Errors
    /// Returns `InvalidWeights` for an unknown schema version or bad weights.
    pub fn weights(&self) -> Result<FusionWeights, FusionError> {
        if self.version != ARTIFACT_VERSION {
            return Err(FusionError::InvalidWeights(format!(
                "unsupported artifact version {}",
                self.version
            )));
        }
        FusionWeights::new(self.retinal_weight, self.lifestyle_weight)
    }
}

/// Combine two risk scores.
///
/// # Errors
/// Returns `InvalidInput` if either score is non-finite or outside [0, 1].
pub fn combine(retinal_risk: f64, lifestyle_risk: f64, weights: &FusionWeights) -> Result<f64, FusionError> {
    for (name, r) in [("retinal_risk", retinal_risk), ("lifestyle_risk", lifestyle_risk)] {
        if !r.is_finite() || !(0.0..=1.0).contains(&r) {
            return Err(FusionError::InvalidInput(format!("{name} {r} not in [0, 1]")));
        }
    }
    // w_r * r + w_l * l with w_l == 1 - w_r; this form is exact at r == l.
    let combined = lifestyle_risk + weights.retinal * (retinal_risk - lifestyle_risk);
    Ok(combined.clamp(0.0, 1.0))
}

/// Fused risk category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskCategory {
    /// Categorize a percentage (0-100).
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent < 25.0 {
            Self::Low
        } else if percent < 50.0 {
            Self::Moderate
        } else if percent < 75.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    /// Categorize a combined score on the 0-1 scale.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        Self::from_percent(score * 100.0)
    }

    /// Stable lowercase name, as stored and serialized.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// Parse the stored name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "moderate" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "very_high" => Some(Self::VeryHigh),
            _ => None,
        }
    }

    /// Patient-facing interpretation of the category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Your current risk of developing diabetes is low. Continue maintaining healthy lifestyle habits.",
            Self::Moderate => "You have a moderate risk of developing diabetes. Making lifestyle changes now can significantly reduce your risk.",
            Self::High => "You have a high risk of developing diabetes. We strongly recommend implementing preventive measures and consulting with a healthcare provider.",
            Self::VeryHigh => "You have a very high risk of developing diabetes. Please consult with a healthcare provider as soon as possible for comprehensive evaluation and intervention.",
        }
    }

    #[must_use]
    pub fn priority(&self) -> Priority {
        match self {
            Self::Low => Priority::Routine,
            Self::Moderate => Priority::Elevated,
            Self::High => Priority::Urgent,
            Self::VeryHigh => Priority::Critical,
        }
    }

    #[must_use]
    pub fn recommended_action(&self) -> &'static str {
        match self {
            Self::Low => "Continue healthy lifestyle habits. Schedule routine check-up in 12 months.",
            Self::Moderate => "Implement lifestyle modifications. Schedule check-up in 6 months.",
            Self::High => "Begin preventive interventions immediately. Consult healthcare provider within 1 month.",
            Self::VeryHigh => "Seek immediate medical evaluation. Schedule appointment within 1-2 weeks.",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
            Self::VeryHigh => write!(f, "VERY HIGH"),
        }
    }
}

/// Follow-up priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Routine,
    Elevated,
    Urgent,
    Critical,
}

/// Confidence in a fused assessment.
///
/// Base 0.75, +0.10 with a completed retinal stage, +0.10 with three or more
/// lifestyle factors, -0.10 within 0.05 of a category boundary. Clamped to
/// [0.5, 0.95].
#[must_use]
pub fn assessment_confidence(combined: f64, retinal_available: bool, lifestyle_factor_count: usize) -> f64 {
    let mut confidence: f64 = 0.75;
    if retinal_available {
        confidence += 0.10;
    }
    if lifestyle_factor_count >= 3 {
        confidence += 0.10;
    }
    if CATEGORY_THRESHOLDS
        .iter()
        .any(|t| (combined - t).abs() < 0.05)
    {
        confidence -= 0.10;
    }
    confidence.clamp(0.5, 0.95)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trained() -> FusionWeights {
        FusionWeights::new(0.103, 0.897).expect("Should be valid")
    }

    #[test]
    fn test_combine_known_case() {
        let combined = combine(0.7, 0.3, &trained()).expect("Should combine");
        assert!((combined - 0.3412).abs() < 1e-9);
        assert_eq!(RiskCategory::from_score(combined), RiskCategory::Moderate);
    }

    #[test]
    fn test_combine_extremes() {
        for w in [trained(), FusionWeights::equal(), FusionWeights::new(1.0, 0.0).expect("Should be valid")] {
            assert_eq!(combine(1.0, 1.0, &w).expect("Should combine"), 1.0);
            assert_eq!(combine(0.0, 0.0, &w).expect("Should combine"), 0.0);
        }
    }

    #[test]
    fn test_combine_bounded_and_monotone() {
        let w = trained();
        let grid: Vec<f64> = (0..=20).map(|i| f64::from(i) / 20.0).collect();
        for &r in &grid {
            let mut prev = -1.0;
            for &l in &grid {
                let c = combine(r, l, &w).expect("Should combine");
                assert!((0.0..=1.0).contains(&c));
                assert!(c >= prev, "not monotone in lifestyle at r={r}, l={l}");
                prev = c;
            }
        }
        for &l in &grid {
            let mut prev = -1.0;
            for &r in &grid {
                let c = combine(r, l, &w).expect("Should combine");
                assert!(c >= prev, "not monotone in retinal at r={r}, l={l}");
                prev = c;
            }
        }
    }

    #[test]
    fn test_combine_rejects_out_of_range() {
        let w = trained();
        assert!(matches!(combine(1.2, 0.3, &w), Err(FusionError::InvalidInput(_))));
        assert!(matches!(combine(0.2, -0.1, &w), Err(FusionError::InvalidInput(_))));
        assert!(matches!(combine(f64::NAN, 0.3, &w), Err(FusionError::InvalidInput(_))));
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(RiskCategory::from_percent(24.99), RiskCategory::Low);
        assert_eq!(RiskCategory::from_percent(25.0), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_percent(49.99), RiskCategory::Moderate);
        assert_eq!(RiskCategory::from_percent(50.0), RiskCategory::High);
        assert_eq!(RiskCategory::from_percent(74.99), RiskCategory::High);
        assert_eq!(RiskCategory::from_percent(75.0), RiskCategory::VeryHigh);
    }

    #[test]
    fn test_weights_validation() {
        assert!(FusionWeights::new(0.3, 0.7).is_ok());
        assert!(FusionWeights::new(0.3, 0.7 + 5e-7).is_ok());
        assert!(FusionWeights::new(0.3, 0.6).is_err());
        assert!(FusionWeights::new(-0.1, 1.1).is_err());
        assert!(FusionWeights::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_weights_within_tolerance_are_normalized() {
        let w = FusionWeights::new(0.3, 0.7 + 5e-7).expect("Should be valid");
        assert_eq!(w.lifestyle(), 1.0 - 0.3);
        let combined = combine(0.9, 0.2, &w).expect("Should combine");
        assert!((combined - (w.retinal() * 0.9 + w.lifestyle() * 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_weights_deserialize_validates() {
        let ok: FusionWeights =
            serde_json::from_str(r#"{"retinal": 0.4, "lifestyle": 0.6}"#).expect("Should parse");
        assert_eq!(ok.retinal(), 0.4);
        assert!(serde_json::from_str::<FusionWeights>(r#"{"retinal": 0.4, "lifestyle": 0.4}"#).is_err());
    }

    #[test]
    fn test_artifact_version_checked() {
        let mut artifact = FusionWeightsArtifact {
            version: ARTIFACT_VERSION,
            retinal_weight: 0.103,
            lifestyle_weight: 0.897,
            created_at: chrono::Utc::now(),
            method: "l-bfgs".to_string(),
            regularization: Some(0.001),
            best_loss: None,
            validation: None,
        };
        assert_eq!(artifact.weights().expect("Should be valid"), trained());

        artifact.version = 2;
        assert!(artifact.weights().is_err());
    }

    #[test]
    fn test_assessment_confidence() {
        assert!((assessment_confidence(0.10, true, 3) - 0.95).abs() < 1e-9);
        assert!((assessment_confidence(0.10, false, 0) - 0.75).abs() < 1e-9);
        assert!((assessment_confidence(0.52, false, 0) - 0.65).abs() < 1e-9);
        assert!((assessment_confidence(0.74, true, 1) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_category_texts() {
        assert_eq!(RiskCategory::High.priority(), Priority::Urgent);
        assert_eq!(RiskCategory::VeryHigh.as_str(), "very_high");
        assert_eq!(RiskCategory::parse("very_high"), Some(RiskCategory::VeryHigh));
        assert!(RiskCategory::Low.recommended_action().contains("12 months"));
    }
}
