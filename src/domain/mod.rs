//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O. All types are
//! serializable and validate their own invariants.

mod assessment;
mod features;
pub mod fusion;
mod retinal;
mod simulation;

pub use assessment::{
    uuid_v4, AnalysisReport, AnalysisStatus, Degradation, FactorSource, KeyFactor, ModelVersions,
    RiskAssessment, Stage, MAX_KEY_FACTORS,
};
pub use features::{
    compute_bmi, FieldError, LifestyleFeatures, LifestylePrediction, Sex,
    ACTIVITY_TARGET_MINUTES_PER_WEEK, REQUIRED_FIELDS,
};
pub use fusion::{
    assessment_confidence, combine, FusionError, FusionWeights, FusionWeightsArtifact, Priority,
    RiskCategory,
};
pub use retinal::{retinal_risk, DrSeverity, RetinalFindings, RetinalPrediction};
pub use simulation::{risk_reduction_percent, LifestyleDelta, PlanType, SimulationScenario};

#[cfg(test)]
pub(crate) use features::sample_features;
