//! Lifestyle adapter: gradient-boosted tree ensemble exported as JSON.
//!
//! Artifact layout:
//!
//! ```json
//! {
//!   "version": "lifestyle-gbm-1.2.0",
//!   "feature_names": ["age", "bmi", ...],
//!   "base_margin": -0.62,
//!   "trees": [ { "nodes": [
//!       { "feature": 1, "threshold": 30.0, "left": 1, "right": 2, "default_left": true },
//!       { "leaf": -0.21 },
//!       { "leaf": 0.34 } ] } ],
//!   "feature_importance": { "bmi": 412.0, ... }
//! }
//! ```
//!
//! A split sends `x < threshold` left. Missing values follow `default_left`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adapters::artifact::{self, ArtifactError, ManifestPolicy};
use crate::domain::{LifestyleFeatures, LifestylePrediction};
use crate::ports::{LifestyleError, LifestylePredictor};

/// One tree node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        /// Index into `feature_names`
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

/// One regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf value for one feature vector.
    fn evaluate(&self, x: &[Option<f64>]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let go_left = match x[*feature] {
                        Some(v) => v < *threshold,
                        None => *default_left,
                    };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
    }

    /// Check that indices are in range and children follow parents, so
    /// evaluation always reaches a leaf.
    fn validate(&self, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { leaf } => {
                    if !leaf.is_finite() {
                        return Err(format!("node {i}: non-finite leaf"));
                    }
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {i}: feature index {feature} out of range"));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {i}: NaN threshold"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {i}: invalid child index {child}"));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Exported ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    /// Log-odds before any tree
    pub base_margin: f64,
    pub trees: Vec<Tree>,
    /// Raw gain per feature name; normalized on load
    #[serde(default)]
    pub feature_importance: BTreeMap<String, f64>,
}

impl GbmArtifact {
    fn validate(&self) -> Result<(), String> {
        if self.feature_names.is_empty() {
            return Err("no features".to_string());
        }
        if let Some(unknown) = self
            .feature_names
            .iter()
            .find(|n| !LifestyleFeatures::is_known_feature(n))
        {
            return Err(format!("unknown feature '{unknown}'"));
        }
        if self.trees.is_empty() {
            return Err("no trees".to_string());
        }
        if !self.base_margin.is_finite() {
            return Err("non-finite base_margin".to_string());
        }
        for (t, tree) in self.trees.iter().enumerate() {
            tree.validate(self.feature_names.len())
                .map_err(|e| format!("tree {t}: {e}"))?;
        }
        Ok(())
    }
}

fn normalized(importance: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = importance.values().filter(|v| v.is_finite() && **v > 0.0).sum();
    if total <= 0.0 {
        return BTreeMap::new();
    }
    importance
        .iter()
        .filter(|(_, v)| v.is_finite() && **v > 0.0)
        .map(|(k, v)| (k.clone(), v / total))
        .collect()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Lifestyle predictor backed by a [`GbmArtifact`].
#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    model: GbmArtifact,
    importance: BTreeMap<String, f64>,
}

impl GradientBoostedModel {
    /// Wrap an in-memory ensemble.
    ///
    /// # Errors
    /// Returns error if the ensemble is structurally invalid.
    pub fn from_artifact(model: GbmArtifact) -> Result<Self, String> {
        model.validate()?;
        let importance = normalized(&model.feature_importance);
        Ok(Self { model, importance })
    }

    /// Load an ensemble from a JSON artifact.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be read, fails its integrity
    /// check, or is structurally invalid.
    pub fn load(path: &Path, policy: ManifestPolicy) -> Result<Self, ArtifactError> {
        let model: GbmArtifact = artifact::load_json(path, policy)?;
        let loaded = Self::from_artifact(model).map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::info!(
            "Loaded lifestyle model {} ({} trees, {} features)",
            loaded.model.version,
            loaded.model.trees.len(),
            loaded.model.feature_names.len()
        );
        Ok(loaded)
    }

    /// Raw log-odds for a record, without validation.
    fn margin(&self, features: &LifestyleFeatures) -> f64 {
        let x: Vec<Option<f64>> = self
            .model
            .feature_names
            .iter()
            .map(|name| features.value_of(name).filter(|v| v.is_finite()))
            .collect();
        self.model
            .trees
            .iter()
            .fold(self.model.base_margin, |acc, tree| acc + tree.evaluate(&x))
    }
}

impl LifestylePredictor for GradientBoostedModel {
    fn predict(&self, features: &LifestyleFeatures) -> Result<LifestylePrediction, LifestyleError> {
        features.validate().map_err(LifestyleError::Validation)?;

        let p = sigmoid(self.margin(features));
        Ok(LifestylePrediction {
            risk_score: p,
            confidence: p.max(1.0 - p),
            feature_importance: self.importance.clone(),
            model_version: self.model.version.clone(),
        })
    }

    fn model_version(&self) -> String {
        self.model.version.clone()
    }
}
