//! Retinal predictor port: image in, DR grade and risk out.

use crate::domain::RetinalPrediction;

/// Errors a retinal predictor may report.
///
/// Both are recoverable for the orchestrator: the retinal stage is skipped
/// and a neutral risk substituted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetinalError {
    #[error("Retinal model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Invalid retinal image: {0}")]
    InvalidImage(String),
}

/// Trait for retinal fundus image classifiers.
pub trait RetinalPredictor: Send + Sync {
    /// Grade one encoded image (JPEG or PNG bytes).
    ///
    /// # Errors
    /// Returns `InvalidImage` for undecodable or low-quality input and
    /// `ModelUnavailable` if no model is loaded.
    fn predict(&self, image: &[u8]) -> Result<RetinalPrediction, RetinalError>;

    /// Version string of the loaded model, if any.
    fn model_version(&self) -> Option<String>;
}
