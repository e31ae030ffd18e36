//! Assessment and report types produced by a completed analysis.

use serde::{Deserialize, Serialize};

use super::features::LifestylePrediction;
use super::fusion::{Priority, RiskCategory};
use super::retinal::RetinalPrediction;
use super::simulation::SimulationScenario;

/// Maximum number of key factors kept on an assessment.
pub const MAX_KEY_FACTORS: usize = 5;

/// Which model surfaced a key factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactorSource {
    Retinal,
    Lifestyle,
}

impl std::fmt::Display for FactorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retinal => write!(f, "RETINAL"),
            Self::Lifestyle => write!(f, "LIFESTYLE"),
        }
    }
}

/// A contributor to the fused risk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFactor {
    pub name: String,
    pub description: String,
    /// Observed value behind the factor, if numeric
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub importance: f64,
    pub modifiable: bool,
    pub source: FactorSource,
}

/// Fused risk for one analysis. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub retinal_risk: f64,
    pub lifestyle_risk: f64,
    pub combined_risk: f64,
    pub risk_category: RiskCategory,
    pub confidence: f64,
    /// Ordered by importance, highest first
    pub key_factors: Vec<KeyFactor>,
}

impl RiskAssessment {
    /// Combined risk on the 0-100 scale.
    #[must_use]
    pub fn combined_percent(&self) -> f64 {
        self.combined_risk * 100.0
    }

    /// Share of risk that lifestyle change could address (0.0 to 0.8).
    ///
    /// Sum of modifiable factor importances, capped at 0.8. Returns 0.1 when
    /// factors exist but none is modifiable.
    #[must_use]
    pub fn prevention_potential(&self) -> f64 {
        if self.key_factors.is_empty() {
            return 0.0;
        }
        let modifiable: Vec<_> = self.key_factors.iter().filter(|f| f.modifiable).collect();
        if modifiable.is_empty() {
            return 0.1;
        }
        modifiable.iter().map(|f| f.importance).sum::<f64>().min(0.8)
    }

    /// Patient-facing interpretation, with finding context appended.
    #[must_use]
    pub fn interpretation(&self, retinal_signs: bool) -> String {
        let mut text = self.risk_category.description().to_string();
        if retinal_signs {
            text.push_str(" Retinal signs consistent with diabetes have been detected.");
        }
        let modifiable = self
            .key_factors
            .iter()
            .filter(|f| f.modifiable && f.source == FactorSource::Lifestyle)
            .count();
        if modifiable > 0 {
            text.push_str(&format!(
                " You have {modifiable} modifiable risk factor(s) that you can address."
            ));
        }
        text
    }
}

/// Pipeline stages that may degrade without failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Retinal,
    Advice,
    Simulation,
}

/// A stage that fell back to its default, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: Stage,
    pub reason: String,
}

/// Degradation flags for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatus {
    pub retinal_degraded: bool,
    pub advice_degraded: bool,
    pub simulations_degraded: bool,
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

impl AnalysisStatus {
    /// Record a degraded stage.
    pub fn degrade(&mut self, stage: Stage, reason: impl Into<String>) {
        match stage {
            Stage::Retinal => self.retinal_degraded = true,
            Stage::Advice => self.advice_degraded = true,
            Stage::Simulation => self.simulations_degraded = true,
        }
        self.degradations.push(Degradation {
            stage,
            reason: reason.into(),
        });
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Versions of the models that contributed to a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelVersions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retinal: Option<String>,
    pub lifestyle: String,
    pub fusion: String,
}

/// Aggregate result of one complete analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Unique identifier
    pub id: String,
    pub assessment: RiskAssessment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retinal: Option<RetinalPrediction>,
    pub lifestyle: LifestylePrediction,
    pub interpretation: String,
    pub priority: Priority,
    pub recommended_action: String,
    pub recommendations: Vec<String>,
    /// See [`RiskAssessment::prevention_potential`]
    #[serde(default)]
    pub prevention_potential: f64,
    #[serde(default)]
    pub scenarios: Vec<SimulationScenario>,
    pub status: AnalysisStatus,
    pub model_versions: ModelVersions,
    pub processing_time_ms: u64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Generate a random UUID v4 string using a CSPRNG.
#[must_use]
pub fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(name: &str, importance: f64, modifiable: bool) -> KeyFactor {
        KeyFactor {
            name: name.to_string(),
            description: String::new(),
            value: None,
            importance,
            modifiable,
            source: FactorSource::Lifestyle,
        }
    }

    fn assessment(key_factors: Vec<KeyFactor>) -> RiskAssessment {
        RiskAssessment {
            retinal_risk: 0.2,
            lifestyle_risk: 0.4,
            combined_risk: 0.38,
            risk_category: RiskCategory::Moderate,
            confidence: 0.75,
            key_factors,
        }
    }

    #[test]
    fn test_prevention_potential() {
        assert_eq!(assessment(vec![]).prevention_potential(), 0.0);
        assert_eq!(
            assessment(vec![factor("Age over 45", 0.3, false)]).prevention_potential(),
            0.1
        );
        let a = assessment(vec![
            factor("High BMI", 0.5, true),
            factor("Smoking", 0.4, true),
        ]);
        assert!((a.prevention_potential() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_interpretation_appends_context() {
        let a = assessment(vec![factor("High BMI", 0.5, true)]);
        let text = a.interpretation(true);
        assert!(text.starts_with("You have a moderate risk"));
        assert!(text.contains("Retinal signs"));
        assert!(text.contains("1 modifiable risk factor(s)"));
    }

    #[test]
    fn test_status_degrade_sets_flags() {
        let mut status = AnalysisStatus::default();
        assert!(!status.is_degraded());

        status.degrade(Stage::Advice, "timed out");
        assert!(status.advice_degraded);
        assert!(!status.retinal_degraded);
        assert_eq!(status.degradations.len(), 1);
    }

    #[test]
    fn test_uuid_generation() {
        let id1 = uuid_v4();
        let id2 = uuid_v4();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
