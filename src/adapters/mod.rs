//! Adapters layer: Concrete implementations of ports.
//!
//! - `retinal`: fundus image quality gate and logistic retinal head
//! - `lifestyle`: gradient-boosted tree ensemble over questionnaire features
//! - `llm`: chat-completion and rule-based advice generators
//! - `sqlite`: SQLite report history
//! - `artifact`: SHA-256 verified JSON model artifacts
//! - `sanitize`: credential and PII filtering for logs

pub mod artifact;
pub mod lifestyle;
pub mod llm;
pub mod retinal;
pub mod sanitize;
pub mod sqlite;

pub use artifact::{ArtifactError, ManifestPolicy};
pub use sqlite::StorageError;
