//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod analysis;
mod history;
mod simulation;
#[cfg(test)]
pub(crate) mod test_support;
pub mod weight_training;

pub use analysis::{AnalysisContext, AnalysisService};
pub use history::{HistoryService, HistorySummary, RiskTrend};
pub use simulation::ScenarioGenerator;
pub use weight_training::{TrainerConfig, TrainingError, TrainingSample, WeightTrainer};
