//! LLM adapter: advice generation over an OpenAI-compatible chat API, with a
//! rule-based fallback and an opt-in retry decorator.

mod chat;
pub mod prompt;
mod retry;
mod rules;

pub use chat::ChatCompletionAdvisor;
pub use retry::{RetryPolicy, WithRetry};
pub use rules::RuleBasedAdvisor;
