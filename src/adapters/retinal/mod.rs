//! Retinal adapter: fundus image grading with an exported logistic head.
//!
//! The image is decoded with the `image` crate, passed through a quality
//! gate, resized to the head's input size and reduced to a small vector of
//! colour and lesion statistics over the fundus region. The head maps that
//! vector to a DR probability.

use std::path::Path;

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::adapters::artifact::{self, ArtifactError, ManifestPolicy};
use crate::domain::{RetinalFindings, RetinalPrediction};
use crate::ports::{RetinalError, RetinalPredictor};

/// Largest accepted encoded image.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Smallest accepted width and height.
pub const MIN_DIMENSION: u32 = 224;

const MIN_MEAN_BRIGHTNESS: f64 = 30.0;
const MAX_MEAN_BRIGHTNESS: f64 = 225.0;

/// Pixels darker than this (mean RGB, 0-1) are treated as background.
const FUNDUS_MASK_THRESHOLD: f64 = 0.04;

const FEATURE_NAMES: [&str; 6] = [
    "mean_red",
    "mean_green",
    "mean_blue",
    "green_std",
    "dark_fraction",
    "bright_fraction",
];

/// Result of the image quality gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageQuality {
    pub is_valid: bool,
    pub message: String,
    /// Resolution and exposure score (0.0 to 1.0)
    pub quality_score: f64,
    pub width: u32,
    pub height: u32,
    /// Mean grey level (0-255)
    pub mean_brightness: f64,
}

impl ImageQuality {
    fn rejected(message: impl Into<String>, score: f64, width: u32, height: u32, brightness: f64) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
            quality_score: score,
            width,
            height,
            mean_brightness: brightness,
        }
    }
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, RetinalError> {
    if bytes.is_empty() {
        return Err(RetinalError::InvalidImage("empty image".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(RetinalError::InvalidImage(format!(
            "image is {} bytes, limit is {MAX_IMAGE_BYTES}",
            bytes.len()
        )));
    }
    image::load_from_memory(bytes).map_err(|e| RetinalError::InvalidImage(format!("cannot decode image: {e}")))
}

/// Quality gate on a decoded image.
#[must_use]
pub fn assess_quality(img: &DynamicImage) -> ImageQuality {
    let (width, height) = (img.width(), img.height());
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return ImageQuality::rejected(
            format!("Image too small ({width}x{height}), minimum {MIN_DIMENSION}x{MIN_DIMENSION} required"),
            0.0,
            width,
            height,
            0.0,
        );
    }

    let gray = img.to_luma8();
    let pixels = gray.as_raw();
    let mean_brightness = pixels.iter().map(|&p| f64::from(p)).sum::<f64>() / pixels.len() as f64;

    if mean_brightness < MIN_MEAN_BRIGHTNESS {
        return ImageQuality::rejected("Image too dark", 0.3, width, height, mean_brightness);
    }
    if mean_brightness > MAX_MEAN_BRIGHTNESS {
        return ImageQuality::rejected("Image too bright", 0.3, width, height, mean_brightness);
    }

    let resolution = (f64::from(width) * f64::from(height) / (1024.0 * 1024.0)).min(1.0);
    let exposure = 1.0 - (mean_brightness - 128.0).abs() / 128.0;

    ImageQuality {
        is_valid: true,
        message: "Image quality acceptable".to_string(),
        quality_score: resolution * exposure,
        width,
        height,
        mean_brightness,
    }
}

/// Decode and check an encoded image without grading it.
///
/// # Errors
/// Returns `InvalidImage` if the bytes are empty, too large or undecodable.
pub fn validate_image(bytes: &[u8]) -> Result<ImageQuality, RetinalError> {
    let img = decode(bytes)?;
    Ok(assess_quality(&img))
}

/// Lesion thresholds used for feature extraction and findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionThresholds {
    /// Green below `mean_green * dark_ratio` counts as a dark lesion
    pub dark_ratio: f64,
    /// Green above `mean_green * bright_ratio` counts as a bright lesion
    pub bright_ratio: f64,
    pub microaneurysm_fraction: f64,
    pub hemorrhage_fraction: f64,
    pub exudate_fraction: f64,
}

/// Exported logistic head.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetinalHead {
    pub version: String,
    pub input_size: u32,
    pub feature_names: Vec<String>,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    pub lesion: LesionThresholds,
}

impl RetinalHead {
    fn validate(&self) -> Result<(), String> {
        if !(32..=1024).contains(&self.input_size) {
            return Err(format!("input_size {} out of range [32, 1024]", self.input_size));
        }
        if self.feature_names.is_empty() || self.feature_names.len() != self.coefficients.len() {
            return Err("coefficients length does not match feature_names".to_string());
        }
        if let Some(unknown) = self
            .feature_names
            .iter()
            .find(|n| !FEATURE_NAMES.contains(&n.as_str()))
        {
            return Err(format!("unknown feature '{unknown}'"));
        }
        let lesion = &self.lesion;
        let numbers = self.coefficients.iter().copied().chain([
            self.intercept,
            lesion.dark_ratio,
            lesion.bright_ratio,
            lesion.microaneurysm_fraction,
            lesion.hemorrhage_fraction,
            lesion.exudate_fraction,
        ]);
        if numbers.into_iter().any(|x| !x.is_finite()) {
            return Err("non-finite parameter".to_string());
        }
        Ok(())
    }
}

/// Colour and lesion statistics over the fundus region (channels in 0-1).
#[derive(Debug, Clone, Copy, PartialEq)]
struct ImageFeatures {
    mean_red: f64,
    mean_green: f64,
    mean_blue: f64,
    green_std: f64,
    dark_fraction: f64,
    bright_fraction: f64,
}

impl ImageFeatures {
    fn value_of(&self, name: &str) -> f64 {
        match name {
            "mean_red" => self.mean_red,
            "mean_green" => self.mean_green,
            "mean_blue" => self.mean_blue,
            "green_std" => self.green_std,
            "dark_fraction" => self.dark_fraction,
            "bright_fraction" => self.bright_fraction,
            _ => 0.0,
        }
    }

    fn extract(img: &DynamicImage, size: u32, lesion: &LesionThresholds) -> Result<Self, RetinalError> {
        let rgb = img.resize_exact(size, size, FilterType::Lanczos3).to_rgb8();

        let fundus: Vec<[f64; 3]> = rgb
            .pixels()
            .map(|p| {
                [
                    f64::from(p[0]) / 255.0,
                    f64::from(p[1]) / 255.0,
                    f64::from(p[2]) / 255.0,
                ]
            })
            .filter(|[r, g, b]| (r + g + b) / 3.0 > FUNDUS_MASK_THRESHOLD)
            .collect();
        if fundus.is_empty() {
            return Err(RetinalError::InvalidImage("no fundus region found".to_string()));
        }

        let n = fundus.len() as f64;
        let mean = |c: usize| fundus.iter().map(|px| px[c]).sum::<f64>() / n;
        let (mean_red, mean_green, mean_blue) = (mean(0), mean(1), mean(2));
        let green_var = fundus
            .iter()
            .map(|px| (px[1] - mean_green).powi(2))
            .sum::<f64>()
            / n;

        let dark_cut = mean_green * lesion.dark_ratio;
        let bright_cut = (mean_green * lesion.bright_ratio).min(1.0);
        let dark = fundus.iter().filter(|px| px[1] < dark_cut).count() as f64;
        let bright = fundus.iter().filter(|px| px[1] > bright_cut).count() as f64;

        Ok(Self {
            mean_red,
            mean_green,
            mean_blue,
            green_std: green_var.sqrt(),
            dark_fraction: dark / n,
            bright_fraction: bright / n,
        })
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Retinal predictor backed by a [`RetinalHead`].
#[derive(Debug, Default)]
pub struct RetinalHeadModel {
    head: Option<RetinalHead>,
}

impl RetinalHeadModel {
    /// Create an adapter with no model loaded.
    #[must_use]
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Wrap an in-memory head.
    ///
    /// # Errors
    /// Returns error if the head's parameters are inconsistent.
    pub fn from_head(head: RetinalHead) -> Result<Self, String> {
        head.validate()?;
        Ok(Self { head: Some(head) })
    }

    /// Load the head from a JSON artifact.
    ///
    /// # Errors
    /// Returns error if the artifact cannot be read, fails its integrity
    /// check, or has inconsistent parameters.
    pub fn load(&mut self, path: &Path, policy: ManifestPolicy) -> Result<(), ArtifactError> {
        let head: RetinalHead = artifact::load_json(path, policy)?;
        head.validate().map_err(|reason| ArtifactError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        tracing::info!(
            "Loaded retinal head {} (input_size={}, n_features={})",
            head.version,
            head.input_size,
            head.feature_names.len()
        );
        self.head = Some(head);
        Ok(())
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.head.is_some()
    }
}

impl RetinalPredictor for RetinalHeadModel {
    fn predict(&self, image: &[u8]) -> Result<RetinalPrediction, RetinalError> {
        let head = self
            .head
            .as_ref()
            .ok_or_else(|| RetinalError::ModelUnavailable("no retinal model loaded".to_string()))?;

        let img = decode(image)?;
        let quality = assess_quality(&img);
        if !quality.is_valid {
            return Err(RetinalError::InvalidImage(quality.message));
        }

        let features = ImageFeatures::extract(&img, head.input_size, &head.lesion)?;
        let logit = head
            .feature_names
            .iter()
            .zip(&head.coefficients)
            .fold(head.intercept, |acc, (name, coef)| acc + coef * features.value_of(name));
        let p = sigmoid(logit);

        let lesion = &head.lesion;
        let findings = RetinalFindings::new(
            features.dark_fraction > lesion.microaneurysm_fraction,
            features.dark_fraction > lesion.hemorrhage_fraction,
            features.bright_fraction > lesion.exudate_fraction,
            p >= 0.7,
        );

        tracing::debug!(
            "Retinal features: dark={:.4}, bright={:.4}, p={:.3}",
            features.dark_fraction,
            features.bright_fraction,
            p
        );

        Ok(RetinalPrediction::from_probability(p, findings, head.version.clone()))
    }

    fn model_version(&self) -> Option<String> {
        self.head.as_ref().map(|h| h.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DrSeverity;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn head() -> RetinalHead {
        RetinalHead {
            version: "retinal-head-test".to_string(),
            input_size: 224,
            feature_names: vec!["dark_fraction".to_string(), "bright_fraction".to_string()],
            coefficients: vec![60.0, 40.0],
            intercept: -2.5,
            lesion: LesionThresholds {
                dark_ratio: 0.5,
                bright_ratio: 1.6,
                microaneurysm_fraction: 0.002,
                hemorrhage_fraction: 0.01,
                exudate_fraction: 0.005,
            },
        }
    }

    fn encode(img: RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .expect("Should encode PNG");
        buf.into_inner()
    }

    fn fundus(size: u32, spots: bool) -> Vec<u8> {
        let img = RgbImage::from_fn(size, size, |x, y| {
            let in_spot = spots && (x / 16) % 3 == 0 && (y / 16) % 3 == 0 && x % 16 < 8 && y % 16 < 8;
            if in_spot {
                Rgb([40, 10, 5])
            } else {
                Rgb([180, 90, 40])
            }
        });
        encode(img)
    }

    #[test]
    fn test_unloaded_model_is_unavailable() {
        let model = RetinalHeadModel::new();
        assert!(!model.is_loaded());
        let err = model.predict(&fundus(256, false)).expect_err("Should fail");
        assert!(matches!(err, RetinalError::ModelUnavailable(_)));
        assert!(model.model_version().is_none());
    }

    #[test]
    fn test_rejects_undecodable_bytes() {
        let model = RetinalHeadModel::from_head(head()).expect("Valid head");
        let err = model.predict(b"not an image").expect_err("Should fail");
        assert!(matches!(err, RetinalError::InvalidImage(_)));
    }

    #[test]
    fn test_rejects_small_and_dark_images() {
        let model = RetinalHeadModel::from_head(head()).expect("Valid head");
        assert!(matches!(
            model.predict(&fundus(100, false)),
            Err(RetinalError::InvalidImage(_))
        ));

        let dark = encode(RgbImage::from_pixel(256, 256, Rgb([10, 10, 10])));
        let quality = validate_image(&dark).expect("Should decode");
        assert!(!quality.is_valid);
        assert_eq!(quality.message, "Image too dark");
    }

    #[test]
    fn test_lesions_raise_probability() {
        let model = RetinalHeadModel::from_head(head()).expect("Valid head");

        let clean = model.predict(&fundus(256, false)).expect("Should grade");
        let spotted = model.predict(&fundus(256, true)).expect("Should grade");

        assert_eq!(clean.severity, DrSeverity::None);
        assert!(!clean.findings.any());
        assert!(spotted.dr_probability > clean.dr_probability);
        assert!(spotted.findings.microaneurysms);
        assert!(spotted.risk_score > clean.risk_score);
        assert_eq!(spotted.model_version, "retinal-head-test");
    }

    #[test]
    fn test_quality_score() {
        let quality = validate_image(&fundus(256, false)).expect("Should decode");
        assert!(quality.is_valid);
        assert!(quality.quality_score > 0.0 && quality.quality_score <= 1.0);
    }

    #[test]
    fn test_head_validation() {
        let mut bad = head();
        bad.coefficients.pop();
        assert!(RetinalHeadModel::from_head(bad).is_err());

        let mut unknown = head();
        unknown.feature_names[0] = "vessel_tortuosity".to_string();
        assert!(RetinalHeadModel::from_head(unknown).is_err());
    }
}
