use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::ports::{
    CompletionRequest, ImprovedPrompt, PromptAnalysis, PromptError, PromptService,
    PromptVariations, TextTransformer, TransformError, DEFAULT_VARIATION_COUNT,
    MAX_CONTEXT_BYTES, MAX_PROMPT_BYTES, MAX_VARIATION_COUNT, MIN_PROMPT_CHARS,
};
use super::templates;
use crate::credits::CreditsService;
use crate::entitlement::EntitlementGate;
use crate::usage::NewUsageRecord;

const ANALYZE_MAX_TOKENS: u32 = 1024;

pub struct PromptServiceImpl {
    gate: Arc<dyn EntitlementGate>,
    credits: Arc<dyn CreditsService>,
    transformer: Arc<dyn TextTransformer>,
}

impl PromptServiceImpl {
    pub fn new(
        gate: Arc<dyn EntitlementGate>,
        credits: Arc<dyn CreditsService>,
        transformer: Arc<dyn TextTransformer>,
    ) -> Self {
        Self {
            gate,
            credits,
            transformer,
        }
    }
}

fn validate_prompt(prompt: &str) -> Result<&str, PromptError> {
    if prompt.len() > MAX_PROMPT_BYTES {
        return Err(PromptError::Validation(format!(
            "Prompt must be at most {MAX_PROMPT_BYTES} bytes"
        )));
    }
    let trimmed = prompt.trim();
    if trimmed.chars().count() < MIN_PROMPT_CHARS {
        return Err(PromptError::Validation(format!(
            "Prompt must be at least {MIN_PROMPT_CHARS} characters"
        )));
    }
    Ok(trimmed)
}

fn validate_context(context: Option<&str>) -> Result<Option<&str>, PromptError> {
    match context {
        Some(c) if c.len() > MAX_CONTEXT_BYTES => Err(PromptError::Validation(format!(
            "Context must be at most {MAX_CONTEXT_BYTES} bytes"
        ))),
        Some(c) if c.trim().is_empty() => Ok(None),
        other => Ok(other),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnalysis {
    clarity: f64,
    specificity: f64,
    context_completeness: f64,
    overall: f64,
    #[serde(default)]
    suggestions: Vec<String>,
}

fn score(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 100.0) as u8
}

fn parse_analysis(text: &str) -> Result<PromptAnalysis, TransformError> {
    let raw: RawAnalysis =
        serde_json::from_str(text).map_err(|e| TransformError::Malformed(e.to_string()))?;

    Ok(PromptAnalysis {
        clarity: score(raw.clarity),
        specificity: score(raw.specificity),
        context_completeness: score(raw.context_completeness),
        overall: score(raw.overall),
        suggestions: raw.suggestions,
    })
}

/// Accepts `{"variations": [...]}`, a bare array, or a single string
#[derive(Deserialize)]
#[serde(untagged)]
enum RawVariations {
    Wrapped { variations: VariationList },
    Bare(VariationList),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VariationList {
    Many(Vec<String>),
    One(String),
}

fn parse_variations(text: &str, count: usize) -> Result<Vec<String>, TransformError> {
    let raw: RawVariations =
        serde_json::from_str(text).map_err(|e| TransformError::Malformed(e.to_string()))?;

    let list = match raw {
        RawVariations::Wrapped { variations } => variations,
        RawVariations::Bare(list) => list,
    };
    let variations: Vec<String> = match list {
        VariationList::Many(items) => items,
        VariationList::One(item) => vec![item],
    }
    .into_iter()
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
    .take(count)
    .collect();

    if variations.is_empty() {
        return Err(TransformError::EmptyOutput);
    }
    Ok(variations)
}

#[async_trait]
impl PromptService for PromptServiceImpl {
    async fn improve(
        &self,
        identity: &str,
        prompt: &str,
        context: Option<&str>,
    ) -> Result<ImprovedPrompt, PromptError> {
        let prompt = validate_prompt(prompt)?;
        let context = validate_context(context)?;

        let entitlement = self.gate.check_entitlement(identity).await?;
        if !entitlement.allowed {
            tracing::info!(
                "Improvement refused at gate: account_id={}, credits={}",
                entitlement.account.id,
                entitlement.account.credits
            );
            return Err(PromptError::InsufficientCredits);
        }
        let account_id = entitlement.account.id;

        let transformation = self
            .transformer
            .complete(CompletionRequest {
                system: Some(templates::improve_system_prompt(context)),
                user: prompt.to_string(),
                max_tokens: None,
                json_output: false,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    "Improvement transformation failed, no credit consumed: account_id={}, error={}",
                    account_id,
                    e
                );
                PromptError::Upstream(e)
            })?;

        let usage = NewUsageRecord::new(prompt, &transformation.text, &transformation.model)?;
        let record = self.credits.consume(account_id, usage).await?;

        Ok(ImprovedPrompt {
            original_prompt: record.original_prompt,
            improved_prompt: record.improved_prompt,
            model: record.model,
        })
    }

    async fn analyze(&self, prompt: &str) -> Result<PromptAnalysis, PromptError> {
        let prompt = validate_prompt(prompt)?;

        let transformation = self
            .transformer
            .complete(CompletionRequest {
                system: None,
                user: templates::analyze_user_prompt(prompt),
                max_tokens: Some(ANALYZE_MAX_TOKENS),
                json_output: true,
            })
            .await?;

        parse_analysis(&transformation.text).map_err(|e| {
            tracing::error!("Analysis response could not be parsed: error={}", e);
            PromptError::Upstream(e)
        })
    }

    async fn variations(
        &self,
        prompt: &str,
        count: Option<u32>,
    ) -> Result<PromptVariations, PromptError> {
        let prompt = validate_prompt(prompt)?;
        let count = count.unwrap_or(DEFAULT_VARIATION_COUNT);
        if !(1..=MAX_VARIATION_COUNT).contains(&count) {
            return Err(PromptError::Validation(format!(
                "count must be between 1 and {MAX_VARIATION_COUNT}"
            )));
        }

        let transformation = self
            .transformer
            .complete(CompletionRequest {
                system: None,
                user: templates::variations_user_prompt(prompt, count),
                max_tokens: None,
                json_output: true,
            })
            .await?;

        let variations = parse_variations(&transformation.text, count as usize).map_err(|e| {
            tracing::error!("Variations response could not be parsed: error={}", e);
            PromptError::Upstream(e)
        })?;

        Ok(PromptVariations {
            original_prompt: prompt.to_string(),
            count: variations.len(),
            variations,
        })
    }
}
