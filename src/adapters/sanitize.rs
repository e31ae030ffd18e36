//! Log sanitization for credentials and personal identifiers.
//!
//! Formatted log lines pass through [`SanitizingMakeWriter`] before reaching
//! the sink. The patterns cover what this service can plausibly leak:
//! - LLM provider API keys and bearer tokens
//! - JWTs and `key=value` style secrets
//! - Email addresses and phone numbers of users
//! - Report and user UUIDs
//!
//! Input is capped at `GLYCOFUSE_SANITIZE_MAX_BYTES` (16 KiB by default)
//! per call; anything beyond the cap is dropped and marked `[TRUNCATED]`.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;
use tracing_subscriber::fmt::MakeWriter;

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

const DEFAULT_SANITIZE_MAX_BYTES: usize = 16 * 1024;

/// Ordered redaction rules. Earlier rules run first, so specific token
/// formats are replaced before the broader contextual rule sees them.
const RULES: &[(&str, &str)] = &[
    // Provider keys: Groq (`gsk_...`) and OpenAI-style (`sk-...`)
    (r"\bgsk_[A-Za-z0-9]{20,}\b", "[REDACTED-API-KEY]"),
    (r"\bsk-(?:proj-)?[A-Za-z0-9_-]{20,}", "[REDACTED-API-KEY]"),
    (
        r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b",
        "[REDACTED-JWT]",
    ),
    (r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{16,}=*", "Bearer [REDACTED-TOKEN]"),
    (
        r"(?i)\b(?:api[_-]?key|access[_-]?token|secret|password|token|authorization)\b\s*[:=]\s*[A-Za-z0-9+/_.-]{16,}={0,2}",
        "[REDACTED-SECRET]",
    ),
    (
        r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
        "[REDACTED-PHONE]",
    ),
    (
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        "[REDACTED-UUID]",
    ),
];

struct Pattern {
    regex: Regex,
    replacement: &'static str,
}

struct Patterns {
    set: RegexSet,
    rules: Vec<Pattern>,
}

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        set: RegexSet::new(RULES.iter().map(|(p, _)| *p)).expect("Valid regex set"),
        rules: RULES
            .iter()
            .map(|(pattern, replacement)| Pattern {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect(),
    })
}

fn max_sanitize_bytes() -> usize {
    std::env::var("GLYCOFUSE_SANITIZE_MAX_BYTES")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SANITIZE_MAX_BYTES)
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Replace credentials and identifiers in `input`.
#[must_use]
pub fn sanitize(input: &str) -> String {
    sanitize_with_limit(input, max_sanitize_bytes())
}

fn sanitize_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let mut result = prefix.to_string();
    if patterns.set.is_match(prefix) {
        // Rules run in declaration order; a later rule may still match text
        // the set did not flag in the original, so re-check each one.
        for rule in &patterns.rules {
            if rule.regex.is_match(&result) {
                result = rule.regex.replace_all(&result, rule.replacement).into_owned();
            }
        }
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Check whether `input` contains anything [`sanitize`] would redact.
#[must_use]
pub fn contains_sensitive(input: &str) -> bool {
    let (prefix, _) = truncate_to_char_boundary(input, max_sanitize_bytes());
    patterns().set.is_match(prefix)
}

/// A `tracing_subscriber` writer wrapper that sanitizes each formatted log
/// line before it is written to the underlying sink.
#[derive(Debug, Clone)]
pub struct SanitizingMakeWriter<M> {
    inner: M,
}

impl<M> SanitizingMakeWriter<M> {
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

/// Line-buffering writer produced by [`SanitizingMakeWriter`].
pub struct SanitizingWriter<W> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: std::io::Write> SanitizingWriter<W> {
    fn flush_lines(&mut self) -> std::io::Result<()> {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.inner
                .write_all(sanitize(&String::from_utf8_lossy(&line)).as_bytes())?;
        }
        Ok(())
    }
}

impl<W: std::io::Write> std::io::Write for SanitizingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);

        // A single line without newlines must not buffer forever.
        let hard_cap = max_sanitize_bytes().saturating_mul(2);
        if self.buffer.len() > hard_cap {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.inner.write_all(sanitize(&line).as_bytes())?;
            self.inner.write_all(b"\n")?;
            self.buffer.clear();
            return Ok(buf.len());
        }

        self.flush_lines()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_lines()?;
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&self.buffer).into_owned();
            self.inner.write_all(sanitize(&rest).as_bytes())?;
            self.buffer.clear();
        }
        self.inner.flush()
    }
}

impl<'a, M> MakeWriter<'a> for SanitizingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = SanitizingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        SanitizingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}
