use crate::LanguageModel;
use crate::error::{LlmError, Result};
use crate::options::{CallSite, CompletionOptions};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Text(String),
    /// Fails with [`LlmError::Unavailable`].
    Error(String),
    /// Sleeps, then answers with the text.
    Delay(Duration, String),
}

impl ScriptedReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptedReply::Text(text.into())
    }

    pub fn json(value: serde_json::Value) -> Self {
        ScriptedReply::Text(value.to_string())
    }
}

/// A prompt the scripted model received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub call_site: CallSite,
    pub prompt: String,
    pub system: Option<String>,
}

/// Deterministic [`LanguageModel`] for tests: replies are popped from a
/// per-call-site queue, then fall back to the call site's default reply.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    queues: Mutex<HashMap<CallSite, VecDeque<ScriptedReply>>>,
    defaults: HashMap<CallSite, ScriptedReply>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next call from `call_site`.
    pub fn with_reply(self, call_site: CallSite, reply: ScriptedReply) -> Self {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(call_site)
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used once the queue for `call_site` is drained.
    pub fn with_default(mut self, call_site: CallSite, reply: ScriptedReply) -> Self {
        self.defaults.insert(call_site, reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, call_site: CallSite) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.call_site == call_site)
            .collect()
    }

    fn next_reply(&self, call_site: CallSite) -> Option<ScriptedReply> {
        let queued = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&call_site)
            .and_then(VecDeque::pop_front);
        queued.or_else(|| self.defaults.get(&call_site).cloned())
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                call_site: options.call_site,
                prompt: prompt.to_string(),
                system: options.system.clone(),
            });

        match self.next_reply(options.call_site) {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Error(reason)) => Err(LlmError::Unavailable(reason)),
            Some(ScriptedReply::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(LlmError::Unavailable(format!(
                "no scripted reply for {}",
                options.call_site
            ))),
        }
    }
}
