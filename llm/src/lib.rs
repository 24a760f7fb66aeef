//! # CodexGraph LLM
//!
//! Text-completion capability used to interpret queries, write Cypher and
//! synthesize answers. Pipeline code depends only on [`LanguageModel`]; the
//! OpenAI-compatible client and the scripted fake are interchangeable.

mod error;
mod json;
mod openai;
mod options;
mod scripted;

pub use error::{LlmError, Result};
pub use json::{extract_json_object, parse_json_object, strip_code_fences};
pub use openai::{
    DEFAULT_BASE_URL, DEFAULT_MODEL, OpenAiChatModel, OpenAiConfig, parse_chat_completion,
};
pub use options::{CallSite, CompletionOptions, ResponseFormat};
pub use scripted::{RecordedCall, ScriptedModel, ScriptedReply};

use async_trait::async_trait;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete `prompt`, returning the raw response text.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}
