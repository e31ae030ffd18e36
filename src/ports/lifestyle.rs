//! Lifestyle predictor port: survey record in, risk probability out.

use crate::domain::{FieldError, LifestyleFeatures, LifestylePrediction};

/// Errors a lifestyle predictor may report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifestyleError {
    #[error("Invalid lifestyle features: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Lifestyle model unavailable: {0}")]
    ModelUnavailable(String),
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Trait for tabular lifestyle risk models.
pub trait LifestylePredictor: Send + Sync {
    /// Predict diabetes risk for one record.
    ///
    /// # Errors
    /// Returns `Validation` naming each missing or out-of-range field.
    fn predict(&self, features: &LifestyleFeatures) -> Result<LifestylePrediction, LifestyleError>;

    /// Version string of the loaded model.
    fn model_version(&self) -> String;
}
