//! Retinal screening results.

use serde::{Deserialize, Serialize};

/// Diabetic-retinopathy severity grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrSeverity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl DrSeverity {
    /// Grade a DR probability.
    #[must_use]
    pub fn from_probability(p: f64) -> Self {
        if p < 0.3 {
            Self::None
        } else if p < 0.5 {
            Self::Mild
        } else if p < 0.7 {
            Self::Moderate
        } else {
            Self::Severe
        }
    }

    /// Contribution of the grade to the retinal risk score.
    #[must_use]
    pub fn risk_weight(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Mild => 0.2,
            Self::Moderate => 0.5,
            Self::Severe => 0.7,
        }
    }
}

impl std::fmt::Display for DrSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Mild => write!(f, "mild"),
            Self::Moderate => write!(f, "moderate"),
            Self::Severe => write!(f, "severe"),
        }
    }
}

/// Lesion findings reported alongside the grade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetinalFindings {
    pub microaneurysms: bool,
    pub hemorrhages: bool,
    pub exudates: bool,
    pub neovascularization: bool,
    pub total_features_detected: u32,
}

impl RetinalFindings {
    #[must_use]
    pub fn new(microaneurysms: bool, hemorrhages: bool, exudates: bool, neovascularization: bool) -> Self {
        let total = [microaneurysms, hemorrhages, exudates, neovascularization]
            .iter()
            .filter(|&&b| b)
            .count() as u32;
        Self {
            microaneurysms,
            hemorrhages,
            exudates,
            neovascularization,
            total_features_detected: total,
        }
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.total_features_detected > 0
    }
}

/// Output of the retinal model for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetinalPrediction {
    pub dr_detected: bool,
    pub severity: DrSeverity,
    /// Raw DR probability (0.0 to 1.0)
    pub dr_probability: f64,
    /// max(p, 1 - p)
    pub confidence: f64,
    /// Diabetes risk implied by the retinal grade (0.0 to 1.0)
    pub risk_score: f64,
    pub findings: RetinalFindings,
    pub model_version: String,
}

impl RetinalPrediction {
    /// Build a prediction from a DR probability.
    #[must_use]
    pub fn from_probability(p: f64, findings: RetinalFindings, model_version: impl Into<String>) -> Self {
        let p = p.clamp(0.0, 1.0);
        let severity = DrSeverity::from_probability(p);
        Self {
            dr_detected: p > 0.5,
            severity,
            dr_probability: p,
            confidence: p.max(1.0 - p),
            risk_score: retinal_risk(p, severity),
            findings,
            model_version: model_version.into(),
        }
    }
}

/// Diabetes risk implied by a DR probability and grade.
///
/// `clamp(2 * (0.8 * p + 0.2 * severity_weight), 0, 1)`
#[must_use]
pub fn retinal_risk(dr_probability: f64, severity: DrSeverity) -> f64 {
    ((dr_probability * 0.8 + severity.risk_weight() * 0.2) * 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_grading() {
        assert_eq!(DrSeverity::from_probability(0.1), DrSeverity::None);
        assert_eq!(DrSeverity::from_probability(0.3), DrSeverity::Mild);
        assert_eq!(DrSeverity::from_probability(0.55), DrSeverity::Moderate);
        assert_eq!(DrSeverity::from_probability(0.7), DrSeverity::Severe);
    }

    #[test]
    fn test_retinal_risk_derivation() {
        // (0.4 * 0.8 + 0.2 * 0.2) * 2 = 0.72
        let risk = retinal_risk(0.4, DrSeverity::Mild);
        assert!((risk - 0.72).abs() < 1e-9);
        assert_eq!(retinal_risk(0.0, DrSeverity::None), 0.0);
        assert_eq!(retinal_risk(0.9, DrSeverity::Severe), 1.0);
    }

    #[test]
    fn test_prediction_from_probability() {
        let pred = RetinalPrediction::from_probability(0.2, RetinalFindings::default(), "v1");
        assert!(!pred.dr_detected);
        assert_eq!(pred.severity, DrSeverity::None);
        assert!((pred.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_findings_count() {
        let f = RetinalFindings::new(true, false, true, false);
        assert_eq!(f.total_features_detected, 2);
        assert!(f.any());
        assert!(!RetinalFindings::default().any());
    }
}
