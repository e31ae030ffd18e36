//! # Glycofuse
//!
//! Diabetes-risk analysis core: fuses a retinal-image risk with a
//! lifestyle-questionnaire risk, writes advice, and projects what-if plans.
//!
//! This crate provides:
//! - Retinal fundus grading and tabular lifestyle scoring from JSON model artifacts
//! - Weighted fusion with offline-trained weights
//! - LLM-backed (or rule-based) recommendations
//! - What-if simulations and a SQLite analysis history
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (features, predictions, fusion, reports)
//! - `ports`: Trait definitions for models, advice and storage
//! - `adapters`: Concrete implementations (image model, tree ensemble, chat API, SQLite)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{AnalysisReport, LifestyleFeatures, RiskAssessment, RiskCategory};

use domain::FieldError;

/// Result type for Glycofuse operations
pub type Result<T> = std::result::Result<T, GlycofuseError>;

/// Main error type for Glycofuse
#[derive(Debug, thiserror::Error)]
pub enum GlycofuseError {
    #[error("Invalid lifestyle features: {}", describe_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Fusion failed: {0}")]
    Fusion(#[from] domain::FusionError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Model artifact error: {0}")]
    Artifact(#[from] adapters::ArtifactError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GlycofuseError {
    /// Whether the caller sent bad input (a 400-equivalent).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Offending field names, for `Validation` errors.
    #[must_use]
    pub fn invalid_fields(&self) -> Vec<&str> {
        match self {
            Self::Validation(errors) => errors.iter().map(|e| e.field.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<ports::LifestyleError> for GlycofuseError {
    fn from(e: ports::LifestyleError) -> Self {
        match e {
            ports::LifestyleError::Validation(errors) => Self::Validation(errors),
            ports::LifestyleError::ModelUnavailable(msg) => Self::ModelUnavailable(msg),
        }
    }
}

fn describe_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
