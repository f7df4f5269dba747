//! Boundary contract for the external generative-language service.
//!
//! The pipeline only depends on [`GenerativeCapability`]; transports (HTTP, subprocess, mock)
//! live behind it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Which synthesis call a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptPurpose {
    ConstructionRisk,
    DecisionSynthesis,
    Explanation,
}

impl PromptPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            PromptPurpose::ConstructionRisk => "construction_risk",
            PromptPurpose::DecisionSynthesis => "decision_synthesis",
            PromptPurpose::Explanation => "explanation",
        }
    }
}

/// Prompt handed to the capability: fixed instructions plus structured numeric context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredPrompt {
    pub purpose: PromptPurpose,
    pub system: String,
    pub instructions: String,
    pub context: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("generative capability unavailable: {0}")]
    Unavailable(String),
    #[error("generative capability timed out")]
    Timeout,
    #[error("generative capability rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait GenerativeCapability: Send + Sync {
    /// Returns the raw reply text, expected to be a JSON object matching `response_schema`.
    async fn invoke(
        &self,
        prompt: &StructuredPrompt,
        response_schema: &Value,
        timeout: Duration,
    ) -> Result<String, CapabilityError>;
}

/// Capability used when no generative service is configured. Every call degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCapability;

#[async_trait]
impl GenerativeCapability for OfflineCapability {
    async fn invoke(
        &self,
        _prompt: &StructuredPrompt,
        _response_schema: &Value,
        _timeout: Duration,
    ) -> Result<String, CapabilityError> {
        Err(CapabilityError::Unavailable(
            "no generative service configured".to_string(),
        ))
    }
}
