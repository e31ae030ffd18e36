//! Lifestyle and clinical survey features.
//!
//! Every field is optional on the wire. The lifestyle model enforces the
//! required subset; optional measurements are passed to the model as missing
//! values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::assessment::{FactorSource, KeyFactor};

/// Weekly activity below this many minutes counts as a risk factor.
pub const ACTIVITY_TARGET_MINUTES_PER_WEEK: f64 = 150.0;

/// Importance used for a key factor the model reports nothing about.
const DEFAULT_FACTOR_IMPORTANCE: f64 = 0.1;

/// Fields the lifestyle model cannot run without.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "age",
    "height_cm",
    "weight_kg",
    "physical_activity",
    "sleep_hours",
];

/// Biological sex as reported in the survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
}

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field name, as it appears in the JSON input
    pub field: String,
    /// Human-readable reason
    pub reason: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    fn missing(field: &str) -> Self {
        Self::new(field, "required field is missing")
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Lifestyle and clinical features for diabetes risk prediction.
///
/// Activity is measured in minutes per week. BMI is derived from height and
/// weight when the caller does not supply it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifestyleFeatures {
    /// Age in years
    pub age: Option<f64>,
    pub sex: Option<Sex>,
    /// Height in centimetres
    pub height_cm: Option<f64>,
    /// Weight in kilograms
    pub weight_kg: Option<f64>,
    /// Body mass index (kg/m²)
    pub bmi: Option<f64>,
    /// Waist circumference in centimetres
    pub waist_cm: Option<f64>,
    /// Moderate-or-vigorous activity, minutes per week
    pub physical_activity: Option<f64>,
    /// Average sleep per night, hours
    pub sleep_hours: Option<f64>,
    /// Systolic blood pressure, mmHg
    pub systolic_bp: Option<f64>,
    /// Diastolic blood pressure, mmHg
    pub diastolic_bp: Option<f64>,
    /// Glycated haemoglobin, %
    pub hba1c: Option<f64>,
    /// Fasting plasma glucose, mg/dL
    pub fasting_glucose: Option<f64>,
    /// Self-assessed diet quality on a 0-10 scale
    pub diet_quality: Option<f64>,
    pub family_history: Option<bool>,
    pub smoking: Option<bool>,
    pub hypertension: Option<bool>,
}

/// Accepted range per numeric field: (name, min, max).
const RANGES: [(&str, f64, f64); 12] = [
    ("age", 1.0, 120.0),
    ("height_cm", 50.0, 250.0),
    ("weight_kg", 20.0, 350.0),
    ("bmi", 10.0, 80.0),
    ("waist_cm", 30.0, 250.0),
    ("physical_activity", 0.0, 5040.0),
    ("sleep_hours", 0.0, 24.0),
    ("systolic_bp", 60.0, 260.0),
    ("diastolic_bp", 30.0, 160.0),
    ("hba1c", 3.0, 20.0),
    ("fasting_glucose", 40.0, 600.0),
    ("diet_quality", 0.0, 10.0),
];

impl LifestyleFeatures {
    /// BMI as supplied, or computed from height and weight.
    #[must_use]
    pub fn effective_bmi(&self) -> Option<f64> {
        self.bmi.or_else(|| match (self.height_cm, self.weight_kg) {
            (Some(h), Some(w)) if h > 0.0 => Some(compute_bmi(h, w)),
            _ => None,
        })
    }

    /// Copy with BMI filled in from height and weight when absent.
    #[must_use]
    pub fn with_derived_bmi(&self) -> Self {
        let mut out = self.clone();
        out.bmi = self.effective_bmi();
        out
    }

    /// Numeric value of a named feature, as the models see it.
    ///
    /// Booleans map to 0/1 and sex maps to 0 (female) / 1 (male).
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<f64> {
        let flag = |b: Option<bool>| b.map(|v| if v { 1.0 } else { 0.0 });
        match name {
            "age" => self.age,
            "sex" => self.sex.map(|s| match s {
                Sex::Female => 0.0,
                Sex::Male => 1.0,
            }),
            "height_cm" => self.height_cm,
            "weight_kg" => self.weight_kg,
            "bmi" => self.effective_bmi(),
            "waist_cm" => self.waist_cm,
            "physical_activity" => self.physical_activity,
            "sleep_hours" => self.sleep_hours,
            "systolic_bp" => self.systolic_bp,
            "diastolic_bp" => self.diastolic_bp,
            "hba1c" => self.hba1c,
            "fasting_glucose" => self.fasting_glucose,
            "diet_quality" => self.diet_quality,
            "family_history" => flag(self.family_history),
            "smoking" => flag(self.smoking),
            "hypertension" => flag(self.hypertension),
            _ => None,
        }
    }

    /// Whether `name` is a feature this type can supply.
    #[must_use]
    pub fn is_known_feature(name: &str) -> bool {
        matches!(
            name,
            "age"
                | "sex"
                | "height_cm"
                | "weight_kg"
                | "bmi"
                | "waist_cm"
                | "physical_activity"
                | "sleep_hours"
                | "systolic_bp"
                | "diastolic_bp"
                | "hba1c"
                | "fasting_glucose"
                | "diet_quality"
                | "family_history"
                | "smoking"
                | "hypertension"
        )
    }

    /// Validate required fields and value ranges.
    ///
    /// # Errors
    /// Returns every field-level problem found, in field order.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        for field in REQUIRED_FIELDS {
            if self.value_of(field).is_none() {
                errors.push(FieldError::missing(field));
            }
        }

        for (field, min, max) in RANGES {
            // `value_of("bmi")` would validate the derived value; only check what was sent.
            let value = if field == "bmi" { self.bmi } else { self.value_of(field) };
            if let Some(v) = value {
                if !v.is_finite() || !(min..=max).contains(&v) {
                    errors.push(FieldError::new(
                        field,
                        format!("{v} out of range [{min}, {max}]"),
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Identify lifestyle risk factors present in this record.
    ///
    /// Each factor is weighted by the model's importance for its underlying
    /// feature. Sorted by importance, highest first.
    #[must_use]
    pub fn key_factors(&self, importance: &BTreeMap<String, f64>) -> Vec<KeyFactor> {
        let weight = |feature: &str| {
            importance
                .get(feature)
                .copied()
                .unwrap_or(DEFAULT_FACTOR_IMPORTANCE)
        };
        let mut factors = Vec::new();

        if let Some(bmi) = self.effective_bmi().filter(|&b| b > 30.0) {
            factors.push(KeyFactor {
                name: "High BMI".to_string(),
                description: format!("BMI of {bmi:.1} is in the obese range"),
                value: Some(bmi),
                importance: weight("bmi"),
                modifiable: true,
                source: FactorSource::Lifestyle,
            });
        }
        if let Some(age) = self.age.filter(|&a| a > 45.0) {
            factors.push(KeyFactor {
                name: "Age over 45".to_string(),
                description: format!("Age {age:.0} raises baseline diabetes risk"),
                value: Some(age),
                importance: weight("age"),
                modifiable: false,
                source: FactorSource::Lifestyle,
            });
        }
        if let Some(minutes) = self
            .physical_activity
            .filter(|&m| m < ACTIVITY_TARGET_MINUTES_PER_WEEK)
        {
            factors.push(KeyFactor {
                name: "Low physical activity".to_string(),
                description: format!(
                    "{minutes:.0} min/week is below the {ACTIVITY_TARGET_MINUTES_PER_WEEK:.0} min/week target"
                ),
                value: Some(minutes),
                importance: weight("physical_activity"),
                modifiable: true,
                source: FactorSource::Lifestyle,
            });
        }
        if let Some(hours) = self.sleep_hours.filter(|&h| h < 6.0) {
            factors.push(KeyFactor {
                name: "Insufficient sleep".to_string(),
                description: format!("{hours:.1} hours per night is below 6 hours"),
                value: Some(hours),
                importance: weight("sleep_hours"),
                modifiable: true,
                source: FactorSource::Lifestyle,
            });
        }
        if self.family_history == Some(true) {
            factors.push(KeyFactor {
                name: "Family history of diabetes".to_string(),
                description: "A close relative has diabetes".to_string(),
                value: None,
                importance: weight("family_history"),
                modifiable: false,
                source: FactorSource::Lifestyle,
            });
        }
        if self.smoking == Some(true) {
            factors.push(KeyFactor {
                name: "Smoking".to_string(),
                description: "Smoking increases insulin resistance".to_string(),
                value: None,
                importance: weight("smoking"),
                modifiable: true,
                source: FactorSource::Lifestyle,
            });
        }

        factors.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        factors
    }
}

/// Output of the lifestyle model for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifestylePrediction {
    /// Probability of diabetes risk (0.0 to 1.0)
    pub risk_score: f64,
    /// max(p, 1 - p)
    pub confidence: f64,
    /// Normalized gain per feature, summing to 1 when non-empty
    pub feature_importance: BTreeMap<String, f64>,
    pub model_version: String,
}

/// BMI from height (cm) and weight (kg).
#[must_use]
pub fn compute_bmi(height_cm: f64, weight_kg: f64) -> f64 {
    let m = height_cm / 100.0;
    weight_kg / (m * m)
}

#[cfg(test)]
pub(crate) fn sample_features() -> LifestyleFeatures {
    LifestyleFeatures {
        age: Some(52.0),
        sex: Some(Sex::Male),
        height_cm: Some(175.0),
        weight_kg: Some(98.0),
        physical_activity: Some(60.0),
        sleep_hours: Some(5.5),
        systolic_bp: Some(138.0),
        diet_quality: Some(4.0),
        family_history: Some(true),
        smoking: Some(false),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_is_derived() {
        let f = sample_features();
        let bmi = f.effective_bmi().expect("Should derive BMI");
        assert!((bmi - 32.0).abs() < 0.01);
        assert_eq!(f.with_derived_bmi().bmi, Some(bmi));
    }

    #[test]
    fn test_missing_required_fields_are_reported() {
        let mut f = sample_features();
        f.age = None;
        f.sleep_hours = None;

        let errors = f.validate().expect_err("Should fail validation");
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["age", "sleep_hours"]);
    }

    #[test]
    fn test_out_of_range_values_are_reported() {
        let mut f = sample_features();
        f.hba1c = Some(42.0);
        f.physical_activity = Some(f64::NAN);

        let errors = f.validate().expect_err("Should fail validation");
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.field == "hba1c"));
        assert!(errors.iter().any(|e| e.field == "physical_activity"));
    }

    #[test]
    fn test_value_of_encodes_flags() {
        let f = sample_features();
        assert_eq!(f.value_of("sex"), Some(1.0));
        assert_eq!(f.value_of("family_history"), Some(1.0));
        assert_eq!(f.value_of("smoking"), Some(0.0));
        assert_eq!(f.value_of("hypertension"), None);
        assert_eq!(f.value_of("unknown"), None);
    }

    #[test]
    fn test_key_factors_sorted_by_importance() {
        let f = sample_features();
        let mut importance = BTreeMap::new();
        importance.insert("bmi".to_string(), 0.30);
        importance.insert("age".to_string(), 0.20);
        importance.insert("physical_activity".to_string(), 0.15);
        importance.insert("sleep_hours".to_string(), 0.05);
        importance.insert("family_history".to_string(), 0.25);

        let factors = f.key_factors(&importance);
        let names: Vec<_> = factors.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "High BMI",
                "Family history of diabetes",
                "Age over 45",
                "Low physical activity",
                "Insufficient sleep",
            ]
        );
        assert!(!factors[1].modifiable);
        assert!(factors[0].modifiable);
    }

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let f: LifestyleFeatures =
            serde_json::from_str(r#"{"age": 40, "smoking": true}"#).expect("Should parse");
        assert_eq!(f.age, Some(40.0));
        assert_eq!(f.smoking, Some(true));
        assert!(f.height_cm.is_none());
    }
}
