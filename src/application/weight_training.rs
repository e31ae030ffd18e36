//! Offline fitting of fusion weights.
//!
//! Minimizes `MSE(w * r + (1 - w) * l, y) + λ(w² + (1 - w)²)` over the
//! retinal weight `w`, bounded to [0.01, 0.99], with a projected 1-D
//! quasi-Newton method and Armijo backtracking. Robustness is checked with
//! k-fold cross-validation; the published weight is the fold average.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::domain::fusion::{FoldResult, ValidationSummary, ARTIFACT_VERSION};
use crate::domain::{FusionError, FusionWeights, FusionWeightsArtifact};

/// Method label written into trained artifacts.
pub const TRAINING_METHOD: &str = "projected_bfgs_kfold";

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;
const GRADIENT_TOLERANCE: f64 = 1e-10;

/// One labelled pair of model outputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub retinal: f64,
    pub lifestyle: f64,
    /// Ground truth, 0 or 1 (soft labels in [0, 1] are accepted)
    pub label: f64,
}

impl TrainingSample {
    fn validate(&self, index: usize) -> Result<(), TrainingError> {
        for (name, v) in [
            ("retinal", self.retinal),
            ("lifestyle", self.lifestyle),
            ("label", self.label),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(TrainingError::InvalidSample {
                    index,
                    reason: format!("{name} = {v} not in [0, 1]"),
                });
            }
        }
        Ok(())
    }
}

/// Errors from weight training.
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Need at least {needed} samples for {folds}-fold validation, got {got}")]
    NotEnoughSamples { needed: usize, folds: usize, got: usize },

    #[error("Invalid sample #{index}: {reason}")]
    InvalidSample { index: usize, reason: String },

    #[error("Invalid trainer configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Fusion(#[from] FusionError),
}

/// Trainer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainerConfig {
    /// L2 strength λ
    pub regularization: f64,
    pub folds: usize,
    pub max_iterations: usize,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Starting retinal weight for each fit
    pub initial_weight: f64,
    /// Seed for the fold shuffle
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            regularization: 0.001,
            folds: 5,
            max_iterations: 100,
            lower_bound: 0.01,
            upper_bound: 0.99,
            initial_weight: 0.5,
            seed: 42,
        }
    }
}

/// Result of one bounded minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Optimum {
    pub retinal_weight: f64,
    pub loss: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Mean squared error of the fused prediction at retinal weight `w`.
#[must_use]
pub fn mse(samples: &[TrainingSample], w: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let err = w * s.retinal + (1.0 - w) * s.lifestyle - s.label;
            err * err
        })
        .sum();
    sum / samples.len() as f64
}

/// Regularized training loss.
#[must_use]
pub fn loss(samples: &[TrainingSample], w: f64, regularization: f64) -> f64 {
    mse(samples, w) + regularization * (w * w + (1.0 - w) * (1.0 - w))
}

/// Derivative of [`loss`] with respect to `w`.
#[must_use]
pub fn gradient(samples: &[TrainingSample], w: f64, regularization: f64) -> f64 {
    if samples.is_empty() {
        return 2.0 * regularization * (2.0 * w - 1.0);
    }
    let sum: f64 = samples
        .iter()
        .map(|s| {
            let err = w * s.retinal + (1.0 - w) * s.lifestyle - s.label;
            err * (s.retinal - s.lifestyle)
        })
        .sum();
    2.0 * sum / samples.len() as f64 + 2.0 * regularization * (2.0 * w - 1.0)
}

/// Fits fusion weights from labelled model outputs.
#[derive(Debug, Clone, Default)]
pub struct WeightTrainer {
    config: TrainerConfig,
}

impl WeightTrainer {
    #[must_use]
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    fn project(&self, w: f64) -> f64 {
        w.clamp(self.config.lower_bound, self.config.upper_bound)
    }

    /// Minimize the loss on `samples` within the weight bounds.
    #[must_use]
    pub fn minimize(&self, samples: &[TrainingSample]) -> Optimum {
        let lambda = self.config.regularization;
        let f = |w: f64| loss(samples, w, lambda);
        let df = |w: f64| gradient(samples, w, lambda);

        let mut x = self.project(self.config.initial_weight);
        let mut fx = f(x);
        let mut gx = df(x);
        // Inverse curvature estimate; the secant update makes it exact for a quadratic.
        let mut h = 1.0;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let projected_gradient = x - self.project(x - gx);
            if projected_gradient.abs() < GRADIENT_TOLERANCE {
                converged = true;
                break;
            }

            let direction = -h * gx;
            let mut t = 1.0;
            let mut accepted = None;
            for _ in 0..MAX_BACKTRACKS {
                let candidate = self.project(x + t * direction);
                let fc = f(candidate);
                if fc <= fx + ARMIJO_C1 * gx * (candidate - x) {
                    accepted = Some((candidate, fc));
                    break;
                }
                t *= 0.5;
            }

            let Some((x_new, f_new)) = accepted else {
                converged = true;
                break;
            };
            let step = x_new - x;
            if step.abs() < f64::EPSILON {
                converged = true;
                break;
            }

            let g_new = df(x_new);
            let curvature = step * (g_new - gx);
            if curvature > 1e-18 {
                h = step / (g_new - gx);
            }

            x = x_new;
            fx = f_new;
            gx = g_new;
        }

        tracing::debug!(
            "Minimized in {} iterations: w={:.4}, loss={:.6}",
            iterations,
            x,
            fx
        );
        Optimum {
            retinal_weight: x,
            loss: fx,
            iterations,
            converged,
        }
    }

    /// k-fold cross-validation over a seeded shuffle.
    ///
    /// Returns the fold-averaged, renormalized weights and the summary.
    ///
    /// # Errors
    /// Returns error on invalid samples, too few samples or bad settings.
    pub fn cross_validate(
        &self,
        samples: &[TrainingSample],
    ) -> Result<(FusionWeights, ValidationSummary), TrainingError> {
        let k = self.config.folds;
        if k < 2 {
            return Err(TrainingError::Config(format!("folds must be at least 2, got {k}")));
        }
        if !(self.config.regularization.is_finite() && self.config.regularization >= 0.0) {
            return Err(TrainingError::Config("regularization must be non-negative".to_string()));
        }
        if samples.len() < k {
            return Err(TrainingError::NotEnoughSamples {
                needed: k,
                folds: k,
                got: samples.len(),
            });
        }
        for (i, s) in samples.iter().enumerate() {
            s.validate(i)?;
        }

        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut rng = ChaCha20Rng::seed_from_u64(self.config.seed);
        order.shuffle(&mut rng);

        let mut fold_results = Vec::with_capacity(k);
        for fold in 0..k {
            let (validation, train): (Vec<_>, Vec<_>) = order
                .iter()
                .enumerate()
                .partition(|(pos, _)| pos % k == fold);
            let validation: Vec<TrainingSample> = validation.into_iter().map(|(_, &i)| samples[i]).collect();
            let train: Vec<TrainingSample> = train.into_iter().map(|(_, &i)| samples[i]).collect();

            let optimum = self.minimize(&train);
            let validation_loss = mse(&validation, optimum.retinal_weight);
            tracing::info!(
                "Fold {}/{}: w_retinal={:.4}, train_loss={:.6}, validation_loss={:.6}",
                fold + 1,
                k,
                optimum.retinal_weight,
                optimum.loss,
                validation_loss
            );
            fold_results.push(FoldResult {
                fold: fold + 1,
                retinal_weight: optimum.retinal_weight,
                lifestyle_weight: 1.0 - optimum.retinal_weight,
                train_loss: optimum.loss,
                validation_loss,
            });
        }

        let n = k as f64;
        let avg_retinal = fold_results.iter().map(|f| f.retinal_weight).sum::<f64>() / n;
        let avg_lifestyle = fold_results.iter().map(|f| f.lifestyle_weight).sum::<f64>() / n;
        let retinal = avg_retinal / (avg_retinal + avg_lifestyle);
        let weights = FusionWeights::new(retinal, 1.0 - retinal)?;

        let variance = fold_results
            .iter()
            .map(|f| (f.retinal_weight - avg_retinal).powi(2))
            .sum::<f64>()
            / n;
        let summary = ValidationSummary {
            folds: k,
            mean_validation_loss: fold_results.iter().map(|f| f.validation_loss).sum::<f64>() / n,
            retinal_weight_std: variance.sqrt(),
            fold_results,
        };
        Ok((weights, summary))
    }

    /// Train and assemble a versioned weights artifact.
    ///
    /// # Errors
    /// Same as [`Self::cross_validate`].
    pub fn train(&self, samples: &[TrainingSample]) -> Result<FusionWeightsArtifact, TrainingError> {
        tracing::info!(
            "Training fusion weights on {} samples ({} folds, λ={})",
            samples.len(),
            self.config.folds,
            self.config.regularization
        );
        let (weights, validation) = self.cross_validate(samples)?;
        let best_loss = loss(samples, weights.retinal(), self.config.regularization);
        tracing::info!(
            "Final weights: retinal={:.4}, lifestyle={:.4}, loss={:.6}",
            weights.retinal(),
            weights.lifestyle(),
            best_loss
        );

        Ok(FusionWeightsArtifact {
            version: ARTIFACT_VERSION,
            retinal_weight: weights.retinal(),
            lifestyle_weight: weights.lifestyle(),
            created_at: chrono::Utc::now(),
            method: TRAINING_METHOD.to_string(),
            regularization: Some(self.config.regularization),
            best_loss: Some(best_loss),
            validation: Some(validation),
        })
    }
}

fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1].
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Seeded synthetic validation set.
///
/// Labels are Bernoulli(0.35). The retinal score is the label plus
/// N(0, 0.15) noise, computed from the opposite label 10% of the time; the
/// lifestyle score is the label plus N(0, 0.25) noise. Scores are clipped
/// to [0, 1].
#[must_use]
pub fn synthetic_samples(n: usize, seed: u64) -> Vec<TrainingSample> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let label = if rng.gen_bool(0.35) { 1.0 } else { 0.0 };
            let retinal_base = if rng.gen_bool(0.10) { 1.0 - label } else { label };
            let retinal = (retinal_base + 0.15 * standard_normal(&mut rng)).clamp(0.0, 1.0);
            let lifestyle = (label + 0.25 * standard_normal(&mut rng)).clamp(0.0, 1.0);
            TrainingSample {
                retinal,
                lifestyle,
                label,
            }
        })
        .collect()
}
