//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and its collaborators (models, the advice
//! service, storage).

mod advice;
mod lifestyle;
mod retinal;
mod storage;

pub use advice::{AdviceError, AdviceGenerator, RiskSummary};
pub use lifestyle::{LifestyleError, LifestylePredictor};
pub use retinal::{RetinalError, RetinalPredictor};
pub use storage::{AssessmentStore, ReportPage};
