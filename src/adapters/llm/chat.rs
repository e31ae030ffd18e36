//! OpenAI-compatible chat-completion advisor (Groq by default).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::prompt::{build_advice_prompt, default_recommendations, parse_recommendations, SYSTEM_PROMPT};
use crate::config::LlmConfig;
use crate::domain::KeyFactor;
use crate::ports::{AdviceError, AdviceGenerator, RiskSummary};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Advice generator that calls a chat-completion endpoint.
///
/// The HTTP client carries the configured timeout, so a slow upstream
/// surfaces as `AdviceError::UpstreamTimeout` rather than stalling the
/// analysis.
pub struct ChatCompletionAdvisor {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: Zeroizing<String>,
    temperature: f64,
    max_tokens: u32,
    timeout: Duration,
}

impl std::fmt::Debug for ChatCompletionAdvisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionAdvisor")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionAdvisor {
    /// Build an advisor from configuration and an API key.
    ///
    /// # Errors
    /// Returns `Upstream` if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig, api_key: Zeroizing<String>) -> Result<Self, AdviceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| AdviceError::Upstream(format!("cannot build HTTP client: {e}")))?;

        tracing::info!("Chat-completion advisor initialized with model: {}", config.model);

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }

    /// Send one completion request and return the raw reply text.
    fn complete(&self, prompt: &str) -> Result<String, AdviceError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.as_str())
            .json(&body)
            .send()
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdviceError::Upstream(format!("HTTP {}", status.as_u16())));
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| self.map_transport_error(&e))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdviceError::Upstream("response has no completion".to_string()))?;

        tracing::debug!("Generated {} characters of advice", text.len());
        Ok(text)
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> AdviceError {
        if e.is_timeout() {
            AdviceError::UpstreamTimeout(self.timeout)
        } else if e.is_decode() {
            AdviceError::Upstream(format!("malformed response: {e}"))
        } else {
            AdviceError::Upstream(format!("transport error: {e}"))
        }
    }
}

impl AdviceGenerator for ChatCompletionAdvisor {
    fn generate(&self, summary: &RiskSummary, key_factors: &[KeyFactor]) -> Result<Vec<String>, AdviceError> {
        let prompt = build_advice_prompt(summary, key_factors);
        let text = self.complete(&prompt)?;

        let recs = parse_recommendations(&text);
        if recs.is_empty() {
            tracing::warn!("Advice reply had no parseable recommendations, using defaults");
            return Ok(default_recommendations(key_factors));
        }
        Ok(recs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FactorSource, RiskCategory};
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    fn serve_once(status: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Should bind");
        let addr = listener.local_addr().expect("Should have address");
        std::thread::spawn(move || {
            let Ok((stream, _)) = listener.accept() else { return };
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    return;
                }
                let lower = line.to_ascii_lowercase();
                if let Some(v) = lower.strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap_or(0);
                }
                if line == "\r\n" {
                    break;
                }
            }
            let mut body_buf = vec![0u8; content_length];
            let _ = reader.read_exact(&mut body_buf);

            std::thread::sleep(delay);
            let mut stream = reader.into_inner();
            let _ = write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
        });
        format!("http://{addr}")
    }

    fn advisor(base_url: String, timeout: Duration) -> ChatCompletionAdvisor {
        let config = LlmConfig {
            base_url,
            timeout,
            ..LlmConfig::default()
        };
        ChatCompletionAdvisor::new(&config, Zeroizing::new("test-key".to_string()))
            .expect("Should build advisor")
    }

    fn summary() -> RiskSummary {
        RiskSummary {
            combined_risk: 0.62,
            risk_category: RiskCategory::High,
            retinal_risk: 0.4,
            lifestyle_risk: 0.65,
            dr_severity: None,
            age: Some(50.0),
            bmi: Some(31.0),
            physical_activity: Some(40.0),
            sleep_hours: Some(7.0),
            smoking: None,
        }
    }

    fn factors() -> Vec<KeyFactor> {
        vec![KeyFactor {
            name: "High BMI".to_string(),
            description: String::new(),
            value: Some(31.0),
            importance: 0.3,
            modifiable: true,
            source: FactorSource::Lifestyle,
        }]
    }

    #[test]
    fn test_parses_completion() {
        let url = serve_once(
            "200 OK",
            r###"{"choices":[{"message":{"role":"assistant","content":"## Personalized Recommendations\n1. Walk for 30 minutes after dinner to lower post-meal glucose.\n2. Replace white bread with whole-grain alternatives."}}]}"###,
            Duration::ZERO,
        );
        let recs = advisor(url, Duration::from_secs(5))
            .generate(&summary(), &factors())
            .expect("Should generate");
        assert_eq!(recs.len(), 2);
        assert!(recs[0].starts_with("Walk for 30 minutes"));
    }

    #[test]
    fn test_unparseable_completion_falls_back_to_defaults() {
        let url = serve_once(
            "200 OK",
            r#"{"choices":[{"message":{"content":"Sorry."}}]}"#,
            Duration::ZERO,
        );
        let recs = advisor(url, Duration::from_secs(5))
            .generate(&summary(), &factors())
            .expect("Should generate");
        assert_eq!(recs, default_recommendations(&factors()));
    }

    #[test]
    fn test_http_error_is_upstream() {
        let url = serve_once("503 Service Unavailable", "{}", Duration::ZERO);
        let err = advisor(url, Duration::from_secs(5))
            .generate(&summary(), &factors())
            .expect_err("Should fail");
        assert_eq!(err, AdviceError::Upstream("HTTP 503".to_string()));
    }

    #[test]
    fn test_slow_upstream_times_out() {
        let url = serve_once("200 OK", r#"{"choices":[]}"#, Duration::from_secs(3));
        let timeout = Duration::from_millis(200);
        let err = advisor(url, timeout)
            .generate(&summary(), &factors())
            .expect_err("Should time out");
        assert_eq!(err, AdviceError::UpstreamTimeout(timeout));
    }
}
