//! Hand-written port doubles shared by the application tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::{
    DrSeverity, KeyFactor, LifestyleFeatures, LifestylePrediction, RetinalFindings,
    RetinalPrediction,
};
use crate::ports::{
    AdviceError, AdviceGenerator, LifestyleError, LifestylePredictor, RetinalError,
    RetinalPredictor, RiskSummary,
};

fn importance() -> BTreeMap<String, f64> {
    [
        ("bmi", 0.35),
        ("age", 0.2),
        ("physical_activity", 0.2),
        ("sleep_hours", 0.1),
        ("family_history", 0.1),
        ("smoking", 0.05),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Retinal double returning a fixed result.
pub(crate) struct FixedRetinal {
    result: Result<RetinalPrediction, RetinalError>,
    pub calls: AtomicUsize,
}

impl FixedRetinal {
    /// A prediction with the given risk score and a moderate grade.
    pub fn with_risk(risk: f64) -> Self {
        Self {
            result: Ok(RetinalPrediction {
                dr_detected: true,
                severity: DrSeverity::Moderate,
                dr_probability: 0.62,
                confidence: 0.62,
                risk_score: risk,
                findings: RetinalFindings::new(true, true, false, false),
                model_version: "retinal-test".to_string(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: RetinalError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }
}

impl RetinalPredictor for FixedRetinal {
    fn predict(&self, _image: &[u8]) -> Result<RetinalPrediction, RetinalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }

    fn model_version(&self) -> Option<String> {
        Some("retinal-test".to_string())
    }
}

/// Lifestyle double returning a fixed risk after validating the record.
pub(crate) struct FixedLifestyle {
    risk: f64,
    pub calls: AtomicUsize,
}

impl FixedLifestyle {
    pub fn new(risk: f64) -> Self {
        Self {
            risk,
            calls: AtomicUsize::new(0),
        }
    }
}

impl LifestylePredictor for FixedLifestyle {
    fn predict(&self, features: &LifestyleFeatures) -> Result<LifestylePrediction, LifestyleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        features.validate().map_err(LifestyleError::Validation)?;
        Ok(LifestylePrediction {
            risk_score: self.risk,
            confidence: self.risk.max(1.0 - self.risk),
            feature_importance: importance(),
            model_version: "lifestyle-test".to_string(),
        })
    }

    fn model_version(&self) -> String {
        "lifestyle-test".to_string()
    }
}

/// Lifestyle double with a smooth logistic response to the inputs.
#[derive(Default)]
pub(crate) struct LinearLifestyle;

impl LifestylePredictor for LinearLifestyle {
    fn predict(&self, features: &LifestyleFeatures) -> Result<LifestylePrediction, LifestyleError> {
        features.validate().map_err(LifestyleError::Validation)?;
        let f = features.with_derived_bmi();
        let margin = -1.0
            + 0.12 * (f.bmi.unwrap_or(25.0) - 25.0)
            + 0.03 * (f.age.unwrap_or(40.0) - 40.0)
            - 0.004 * f.physical_activity.unwrap_or(0.0)
            - 0.15 * (f.diet_quality.unwrap_or(5.0) - 5.0)
            - 0.2 * (f.sleep_hours.unwrap_or(7.0).min(8.0) - 7.0)
            + if f.smoking == Some(true) { 0.5 } else { 0.0 };
        let p = 1.0 / (1.0 + (-margin).exp());
        Ok(LifestylePrediction {
            risk_score: p,
            confidence: p.max(1.0 - p),
            feature_importance: importance(),
            model_version: "lifestyle-linear".to_string(),
        })
    }

    fn model_version(&self) -> String {
        "lifestyle-linear".to_string()
    }
}

/// Advice double returning a fixed result.
pub(crate) struct StubAdvisor {
    result: Result<Vec<String>, AdviceError>,
    pub calls: AtomicUsize,
}

impl StubAdvisor {
    pub fn ok(recs: &[&str]) -> Self {
        Self {
            result: Ok(recs.iter().map(ToString::to_string).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AdviceError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AdviceGenerator for StubAdvisor {
    fn generate(&self, _summary: &RiskSummary, _key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.clone()
    }
}
