use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline step issued a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSite {
    IntentExtraction,
    Translation,
    Synthesis,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallSite::IntentExtraction => "intent_extraction",
            CallSite::Translation => "translation",
            CallSite::Synthesis => "synthesis",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// Ask the backend to constrain output to a single JSON object.
    JsonObject,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub response_format: ResponseFormat,
    pub call_site: CallSite,
}

impl CompletionOptions {
    pub fn new(call_site: CallSite) -> Self {
        Self {
            system: None,
            temperature: 0.1,
            max_tokens: None,
            response_format: ResponseFormat::Text,
            call_site,
        }
    }

    /// Options for a call site that must answer with one JSON object.
    pub fn json(call_site: CallSite) -> Self {
        Self {
            response_format: ResponseFormat::JsonObject,
            ..Self::new(call_site)
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}
