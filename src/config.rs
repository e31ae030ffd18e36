//! Environment-driven configuration.
//!
//! Every setting has a default; malformed or out-of-range environment values
//! are ignored with a warning instead of failing startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use zeroize::Zeroizing;

use crate::adapters::llm::RetryPolicy;
use crate::adapters::ManifestPolicy;

/// Secret sources for the LLM API key, in precedence order:
/// - `GLYCOFUSE_LLM_API_KEY_FD` (read from an already-open FD, then close it)
/// - `GLYCOFUSE_LLM_API_KEY_FILE` (read from a file path)
/// - `/run/secrets/glycofuse_llm_api_key` (Docker/Compose secret default)
/// - `GLYCOFUSE_LLM_API_KEY`
const API_KEY_FD_ENV: &str = "GLYCOFUSE_LLM_API_KEY_FD";
const API_KEY_FILE_ENV: &str = "GLYCOFUSE_LLM_API_KEY_FILE";
const API_KEY_DOCKER_SECRET_PATH: &str = "/run/secrets/glycofuse_llm_api_key";
const API_KEY_ENV: &str = "GLYCOFUSE_LLM_API_KEY";

const WEIGHTS_FILE: &str = "fusion_weights.json";

/// Default end-to-end processing target for one analysis.
pub const DEFAULT_PROCESSING_BUDGET: Duration = Duration::from_secs(2);

/// Settings for the chat-completion advisor.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Whole-request timeout; keeps the advice stage inside the processing budget
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "openai/gpt-oss-120b".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout: Duration::from_millis(1500),
        }
    }
}

impl LlmConfig {
    /// Full URL of the chat-completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Directory holding `retinal_head.json`, `lifestyle_gbm.json` and the manifest
    pub model_dir: PathBuf,
    /// Fusion weights artifact; defaults to `<model_dir>/fusion_weights.json`
    pub weights_path: PathBuf,
    pub database_path: PathBuf,
    pub manifest_policy: ManifestPolicy,
    pub llm: LlmConfig,
    pub retry: RetryPolicy,
    pub processing_budget: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        let model_dir = PathBuf::from("models");
        Self {
            weights_path: model_dir.join(WEIGHTS_FILE),
            model_dir,
            database_path: PathBuf::from("data/glycofuse.db"),
            manifest_policy: ManifestPolicy::Optional,
            llm: LlmConfig::default(),
            retry: RetryPolicy::default(),
            processing_budget: DEFAULT_PROCESSING_BUDGET,
        }
    }
}

impl AppConfig {
    /// Build configuration from `GLYCOFUSE_*` environment variables.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("GLYCOFUSE_MODEL_DIR") {
            cfg.set_model_dir(PathBuf::from(v));
        }
        if let Some(v) = get("GLYCOFUSE_FUSION_WEIGHTS") {
            cfg.weights_path = PathBuf::from(v);
        }
        if let Some(v) = get("GLYCOFUSE_DATABASE_PATH") {
            cfg.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("GLYCOFUSE_REQUIRE_ARTIFACT_MANIFEST") {
            match parse_bool(&v) {
                Some(true) => cfg.manifest_policy = ManifestPolicy::Required,
                Some(false) => cfg.manifest_policy = ManifestPolicy::Optional,
                None => tracing::warn!("Ignoring GLYCOFUSE_REQUIRE_ARTIFACT_MANIFEST={}", v),
            }
        }

        if let Some(v) = get("GLYCOFUSE_LLM_BASE_URL") {
            if v.starts_with("http://") || v.starts_with("https://") {
                cfg.llm.base_url = v;
            } else {
                tracing::warn!("Ignoring GLYCOFUSE_LLM_BASE_URL without http(s) scheme");
            }
        }
        if let Some(v) = get("GLYCOFUSE_LLM_MODEL") {
            cfg.llm.model = v;
        }
        if let Some(v) = get("GLYCOFUSE_LLM_TEMPERATURE") {
            match v.parse::<f64>() {
                Ok(x) if x.is_finite() && (0.0..=2.0).contains(&x) => cfg.llm.temperature = x,
                _ => tracing::warn!("Ignoring GLYCOFUSE_LLM_TEMPERATURE={}", v),
            }
        }
        if let Some(v) = get("GLYCOFUSE_LLM_MAX_TOKENS") {
            match v.parse::<u32>() {
                Ok(x) if x > 0 => cfg.llm.max_tokens = x,
                _ => tracing::warn!("Ignoring GLYCOFUSE_LLM_MAX_TOKENS={}", v),
            }
        }
        if let Some(v) = get("GLYCOFUSE_LLM_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(x) if x > 0 => cfg.llm.timeout = Duration::from_millis(x),
                _ => tracing::warn!("Ignoring GLYCOFUSE_LLM_TIMEOUT_MS={}", v),
            }
        }
        if let Some(v) = get("GLYCOFUSE_LLM_MAX_ATTEMPTS") {
            match v.parse::<u32>() {
                Ok(x) if (1..=10).contains(&x) => cfg.retry.max_attempts = x,
                _ => tracing::warn!("Ignoring GLYCOFUSE_LLM_MAX_ATTEMPTS={}", v),
            }
        }

        cfg
    }

    /// Point at another model directory.
    ///
    /// The weights path follows the directory only while it is still the
    /// default `<model_dir>/fusion_weights.json`.
    pub fn set_model_dir(&mut self, dir: PathBuf) {
        if self.weights_path == self.model_dir.join(WEIGHTS_FILE) {
            self.weights_path = dir.join(WEIGHTS_FILE);
        }
        self.model_dir = dir;
    }

    #[must_use]
    pub fn retinal_model_path(&self) -> PathBuf {
        self.model_dir.join("retinal_head.json")
    }

    #[must_use]
    pub fn lifestyle_model_path(&self) -> PathBuf {
        self.model_dir.join("lifestyle_gbm.json")
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty_secret(raw: &str) -> Option<Zeroizing<String>> {
    let secret = raw.trim_end_matches(['\n', '\r']).trim();
    if secret.is_empty() {
        None
    } else {
        Some(Zeroizing::new(secret.to_string()))
    }
}

fn read_secret_file(path: &Path) -> Option<Zeroizing<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let content = Zeroizing::new(content);
            non_empty_secret(&content)
        }
        Err(e) => {
            tracing::warn!("Cannot read API key file {}: {}", path.display(), e);
            None
        }
    }
}

/// Read the LLM API key from the first configured secret source.
///
/// Returns `None` when no source is configured; the caller then falls back
/// to rule-based advice.
#[must_use]
pub fn llm_api_key() -> Option<Zeroizing<String>> {
    #[cfg(unix)]
    if let Ok(fd_str) = std::env::var(API_KEY_FD_ENV) {
        use std::io::Read;
        use std::os::unix::io::FromRawFd;

        let fd: i32 = match fd_str.trim().parse() {
            Ok(fd) if fd > 2 => fd,
            _ => {
                tracing::warn!("Refusing {}={}: not a non-stdio descriptor", API_KEY_FD_ENV, fd_str);
                return None;
            }
        };
        // SAFETY: the descriptor is handed over for a one-time read; dropping
        // the File closes it.
        let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
        let mut buf = Zeroizing::new(String::new());
        if let Err(e) = file.read_to_string(&mut buf) {
            tracing::warn!("Failed reading API key from FD: {}", e);
            return None;
        }
        return non_empty_secret(&buf);
    }

    if let Ok(path) = std::env::var(API_KEY_FILE_ENV) {
        return read_secret_file(Path::new(path.trim()));
    }

    let docker_secret = Path::new(API_KEY_DOCKER_SECRET_PATH);
    if docker_secret.exists() {
        return read_secret_file(docker_secret);
    }

    std::env::var(API_KEY_ENV)
        .ok()
        .and_then(|v| non_empty_secret(&Zeroizing::new(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.llm.timeout, Duration::from_millis(1500));
        assert_eq!(cfg.retry.max_attempts, 1);
        assert_eq!(cfg.weights_path, PathBuf::from("models/fusion_weights.json"));
        assert_eq!(
            cfg.llm.endpoint(),
            "https://api.groq.com/openai/v1/chat/completions"
        );
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("GLYCOFUSE_MODEL_DIR", "/opt/models"),
            ("GLYCOFUSE_LLM_BASE_URL", "http://localhost:8080/v1/"),
            ("GLYCOFUSE_LLM_TIMEOUT_MS", "900"),
            ("GLYCOFUSE_LLM_MAX_ATTEMPTS", "3"),
            ("GLYCOFUSE_REQUIRE_ARTIFACT_MANIFEST", "true"),
        ]));
        assert_eq!(cfg.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(cfg.weights_path, PathBuf::from("/opt/models/fusion_weights.json"));
        assert_eq!(cfg.retinal_model_path(), PathBuf::from("/opt/models/retinal_head.json"));
        assert_eq!(cfg.llm.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(cfg.llm.timeout, Duration::from_millis(900));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.manifest_policy, ManifestPolicy::Required);
    }

    #[test]
    fn test_explicit_weights_path_wins() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("GLYCOFUSE_FUSION_WEIGHTS", "/etc/glycofuse/weights.json"),
            ("GLYCOFUSE_MODEL_DIR", "/opt/models"),
        ]));
        assert_eq!(cfg.weights_path, PathBuf::from("/etc/glycofuse/weights.json"));
    }

    #[test]
    fn test_model_dir_override_keeps_explicit_weights() {
        let mut cfg = AppConfig::from_lookup(lookup(&[(
            "GLYCOFUSE_FUSION_WEIGHTS",
            "/etc/glycofuse/weights.json",
        )]));
        cfg.set_model_dir(PathBuf::from("/srv/models"));
        assert_eq!(cfg.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(cfg.weights_path, PathBuf::from("/etc/glycofuse/weights.json"));

        let mut cfg = AppConfig::default();
        cfg.set_model_dir(PathBuf::from("/srv/models"));
        assert_eq!(cfg.weights_path, PathBuf::from("/srv/models/fusion_weights.json"));
    }

    #[test]
    fn test_invalid_values_ignored() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("GLYCOFUSE_LLM_TEMPERATURE", "hot"),
            ("GLYCOFUSE_LLM_TIMEOUT_MS", "0"),
            ("GLYCOFUSE_LLM_MAX_ATTEMPTS", "50"),
            ("GLYCOFUSE_LLM_BASE_URL", "ftp://example.org"),
            ("GLYCOFUSE_REQUIRE_ARTIFACT_MANIFEST", "maybe"),
        ]));
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_secret_file_is_trimmed() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("key");
        std::fs::write(&path, "gsk_test_value\n").expect("Should write");
        let key = read_secret_file(&path).expect("Should read key");
        assert_eq!(key.as_str(), "gsk_test_value");

        std::fs::write(&path, "\n").expect("Should write");
        assert!(read_secret_file(&path).is_none());
    }
}
