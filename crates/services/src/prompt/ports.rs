use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credits::ConsumeError;
use crate::entitlement::EntitlementError;
use crate::usage::UsageValidationError;

pub const MIN_PROMPT_CHARS: usize = 10;
pub const MAX_PROMPT_BYTES: usize = 64 * 1024;
pub const MAX_CONTEXT_BYTES: usize = 64 * 1024;
pub const DEFAULT_VARIATION_COUNT: u32 = 3;
pub const MAX_VARIATION_COUNT: u32 = 10;

/// One chat-style completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user: String,
    /// Overrides the transformer's default output budget
    pub max_tokens: Option<u32>,
    /// Ask the model for a single JSON object
    pub json_output: bool,
}

/// Non-empty model output and the model that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformation {
    pub text: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Upstream request failed: {0}")]
    Request(String),
    #[error("Upstream request timed out")]
    Timeout,
    #[error("Upstream returned status {status}")]
    Status { status: u16 },
    #[error("Malformed upstream response: {0}")]
    Malformed(String),
    #[error("Upstream returned no content")]
    EmptyOutput,
}

/// External text-transformation collaborator
#[async_trait]
pub trait TextTransformer: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Transformation, TransformError>;
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovedPrompt {
    pub original_prompt: String,
    pub improved_prompt: String,
    pub model: String,
}

/// Quality scores, each in 0..=100
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    pub clarity: u8,
    pub specificity: u8,
    pub context_completeness: u8,
    pub overall: u8,
    pub suggestions: Vec<String>,
}

#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptVariations {
    pub original_prompt: String,
    pub variations: Vec<String>,
    pub count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Missing or empty identity")]
    Unauthenticated,
    #[error("{0}")]
    Validation(String),
    #[error("Insufficient credits")]
    InsufficientCredits,
    #[error("Account not found")]
    NotFound,
    #[error("Text transformation failed: {0}")]
    Upstream(#[from] TransformError),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<EntitlementError> for PromptError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Unauthenticated => Self::Unauthenticated,
            EntitlementError::Database(msg) => Self::Database(msg),
        }
    }
}

impl From<ConsumeError> for PromptError {
    fn from(err: ConsumeError) -> Self {
        match err {
            ConsumeError::InsufficientCredits => Self::InsufficientCredits,
            ConsumeError::NotFound => Self::NotFound,
            ConsumeError::Validation(e) => Self::Validation(e.to_string()),
            ConsumeError::Database(msg) => Self::Database(msg),
        }
    }
}

impl From<UsageValidationError> for PromptError {
    fn from(err: UsageValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

#[async_trait]
pub trait PromptService: Send + Sync {
    /// Metered: gate, transform, then debit and record on success
    async fn improve(
        &self,
        identity: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<ImprovedPrompt, PromptError>;

    async fn analyze(&self, prompt: &str) -> Result<PromptAnalysis, PromptError>;

    async fn variations(
        &self,
        prompt: &str,
        count: Option<u32>,
    ) -> Result<PromptVariations, PromptError>;
}
