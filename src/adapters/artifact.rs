//! Model artifact loading with integrity checks.
//!
//! A model directory may carry a `manifest.json` binding each artifact file
//! name to its SHA-256 digest:
//!
//! ```json
//! { "version": 1, "files": { "lifestyle_gbm.json": "9f86d0...", ... } }
//! ```
//!
//! When the manifest exists, every artifact loaded from that directory must
//! be listed and must match. Without a manifest, loading proceeds unless the
//! policy requires one (`GLYCOFUSE_REQUIRE_ARTIFACT_MANIFEST=true`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{FusionWeights, FusionWeightsArtifact};

/// Manifest file name inside a model directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// Errors from artifact loading.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("Digest mismatch for {0}")]
    DigestMismatch(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl ArtifactError {
    fn invalid(path: &Path, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Whether a model directory must carry a manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestPolicy {
    /// Verify against the manifest when one exists.
    #[default]
    Optional,
    /// Refuse to load artifacts without a manifest.
    Required,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct ArtifactManifest {
    version: u32,
    files: BTreeMap<String, String>,
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn file_name(path: &Path) -> Result<&str, ArtifactError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArtifactError::invalid(path, "path has no file name"))
}

fn manifest_path_for(path: &Path) -> PathBuf {
    path.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(MANIFEST_FILE)
}

fn read_manifest(manifest_path: &Path) -> Result<Option<ArtifactManifest>, ArtifactError> {
    if !manifest_path.exists() {
        return Ok(None);
    }
    let content = fs::read(manifest_path).map_err(|source| ArtifactError::Io {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let manifest: ArtifactManifest = serde_json::from_slice(&content)
        .map_err(|e| ArtifactError::Manifest(format!("invalid {MANIFEST_FILE}: {e}")))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(ArtifactError::Manifest(format!(
            "unsupported manifest version: {}",
            manifest.version
        )));
    }
    Ok(Some(manifest))
}

/// Read an artifact's bytes, verifying them against the directory manifest.
///
/// # Errors
/// Returns error if the file cannot be read, the manifest is malformed or
/// missing under `ManifestPolicy::Required`, the file is not listed, or its
/// digest does not match.
pub fn read_verified(path: &Path, policy: ManifestPolicy) -> Result<Vec<u8>, ArtifactError> {
    let bytes = fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = file_name(path)?;

    match read_manifest(&manifest_path_for(path))? {
        Some(manifest) => {
            let expected = manifest.files.get(name).ok_or_else(|| {
                ArtifactError::Manifest(format!("{name} is not listed in {MANIFEST_FILE}"))
            })?;
            let actual = sha256_hex(&bytes);
            if !expected.trim().eq_ignore_ascii_case(&actual) {
                tracing::error!("Artifact {} failed integrity check", name);
                return Err(ArtifactError::DigestMismatch(name.to_string()));
            }
            tracing::debug!("Verified artifact {} against manifest", name);
        }
        None => {
            if policy == ManifestPolicy::Required {
                return Err(ArtifactError::Manifest(format!(
                    "{MANIFEST_FILE} required next to {name}"
                )));
            }
            tracing::warn!("Loading {} without an integrity manifest", name);
        }
    }

    Ok(bytes)
}

/// Read and parse a JSON artifact.
///
/// # Errors
/// See [`read_verified`]; also fails if the JSON does not match `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path, policy: ManifestPolicy) -> Result<T, ArtifactError> {
    let bytes = read_verified(path, policy)?;
    serde_json::from_slice(&bytes).map_err(|e| ArtifactError::invalid(path, e.to_string()))
}

/// Load and validate the fusion weights artifact.
///
/// # Errors
/// Fails on read, integrity, parse, schema-version or weight-constraint
/// errors.
pub fn load_fusion_weights(
    path: &Path,
    policy: ManifestPolicy,
) -> Result<(FusionWeights, FusionWeightsArtifact), ArtifactError> {
    let artifact: FusionWeightsArtifact = load_json(path, policy)?;
    let weights = artifact
        .weights()
        .map_err(|e| ArtifactError::invalid(path, e.to_string()))?;
    tracing::info!(
        "Loaded fusion weights: retinal={:.3}, lifestyle={:.3} ({})",
        weights.retinal(),
        weights.lifestyle(),
        artifact.method
    );
    Ok((weights, artifact))
}

/// Write a JSON artifact and refresh its digest in an existing manifest.
///
/// # Errors
/// Returns error if serialization or any write fails.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| ArtifactError::invalid(path, e.to_string()))?;
    fs::write(path, &bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest_path = manifest_path_for(path);
    if let Some(mut manifest) = read_manifest(&manifest_path)? {
        let name = file_name(path)?.to_string();
        manifest.files.insert(name.clone(), sha256_hex(&bytes));
        let out = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| ArtifactError::Manifest(e.to_string()))?;
        fs::write(&manifest_path, out).map_err(|source| ArtifactError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        tracing::info!("Updated {} digest for {}", MANIFEST_FILE, name);
    }
    Ok(())
}
