pub mod openai;
pub mod ports;
pub mod service;
pub mod templates;

pub use openai::{OpenAiTransformer, OpenAiTransformerConfig};
pub use ports::{
    CompletionRequest, ImprovedPrompt, PromptAnalysis, PromptError, PromptService,
    PromptVariations, TextTransformer, TransformError, Transformation, DEFAULT_VARIATION_COUNT,
    MAX_CONTEXT_BYTES, MAX_PROMPT_BYTES, MAX_VARIATION_COUNT, MIN_PROMPT_CHARS,
};
pub use service::PromptServiceImpl;
