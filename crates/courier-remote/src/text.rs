//! AI text service contract (translation / explanation).
//!
//! The functions behind this run in the cloud and are out of core scope;
//! the engine only depends on this stable request/response shape and
//! tolerates arbitrary latency.  A spent daily quota surfaces as
//! [`RemoteError::QuotaExhausted`] and is not retryable until reset, so
//! callers suppress the feature while offline instead of retrying.
//!
//! [`RemoteError::QuotaExhausted`]: crate::RemoteError::QuotaExhausted

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Formal,
    Informal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRequest {
    pub text: String,
    /// Target language for translation; `None` asks for an explanation.
    pub target_language: Option<String>,
    pub formality: Option<Formality>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TextOutput {
    Translation(String),
    Explanation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextResponse {
    pub output: TextOutput,
    /// Whether the service answered from its cache.
    pub cached: bool,
    pub response_time_ms: u64,
}

#[async_trait]
pub trait TextService: Send + Sync + 'static {
    async fn process(&self, request: TextRequest) -> Result<TextResponse>;
}
