use crate::error::CollaboratorTimeout;
use codexgraph_llm::{CompletionOptions, LanguageModel, LlmError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Prompt strictness. `Strict` is used for the single retry after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Standard,
    Strict,
}

#[derive(Debug)]
pub(crate) enum CallFailure {
    Timeout(CollaboratorTimeout),
    Collaborator(LlmError),
    Malformed(String),
}

impl CallFailure {
    fn describe(&self) -> String {
        match self {
            CallFailure::Timeout(t) => t.to_string(),
            CallFailure::Collaborator(e) => e.to_string(),
            CallFailure::Malformed(reason) => reason.clone(),
        }
    }
}

/// Call the model with a timeout and parse the reply. Any failure gets one
/// more attempt with a strict prompt that quotes the failure.
///
/// Returns the parsed value and the number of attempts used.
pub(crate) async fn call_structured<T, B, P>(
    model: &dyn LanguageModel,
    options: &CompletionOptions,
    timeout: Duration,
    build: B,
    parse: P,
) -> Result<(T, u32), CallFailure>
where
    B: Fn(PromptMode, Option<&str>) -> String,
    P: Fn(&str) -> Result<T, String>,
{
    let first = attempt(model, options, timeout, &build(PromptMode::Standard, None), 1, &parse).await;
    let failure = match first {
        Ok(value) => return Ok((value, 1)),
        Err(failure) => failure,
    };

    let feedback = failure.describe();
    warn!(call_site = %options.call_site, error = %feedback, "retrying with strict prompt");
    let prompt = build(PromptMode::Strict, Some(&feedback));
    attempt(model, options, timeout, &prompt, 2, &parse)
        .await
        .map(|value| (value, 2))
}

async fn attempt<T, P>(
    model: &dyn LanguageModel,
    options: &CompletionOptions,
    timeout: Duration,
    prompt: &str,
    attempt: u32,
    parse: &P,
) -> Result<T, CallFailure>
where
    P: Fn(&str) -> Result<T, String>,
{
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, model.complete(prompt, options)).await;
    debug!(
        call_site = %options.call_site,
        attempt,
        prompt_chars = prompt.len(),
        latency_ms = started.elapsed().as_millis() as u64,
        "language model call"
    );

    match outcome {
        Err(_) => Err(CallFailure::Timeout(CollaboratorTimeout {
            collaborator: format!("language model ({})", options.call_site),
            timeout_ms: timeout.as_millis() as u64,
        })),
        Ok(Err(err)) => Err(CallFailure::Collaborator(err)),
        Ok(Ok(text)) => parse(&text).map_err(CallFailure::Malformed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codexgraph_llm::{CallSite, ScriptedModel, ScriptedReply};
    use pretty_assertions::assert_eq;

    fn build(mode: PromptMode, feedback: Option<&str>) -> String {
        match mode {
            PromptMode::Standard => "say a number".to_string(),
            PromptMode::Strict => format!("STRICT say a number ({})", feedback.unwrap_or("")),
        }
    }

    fn parse(text: &str) -> Result<u32, String> {
        text.trim().parse::<u32>().map_err(|e| e.to_string())
    }

    #[tokio::test]
    async fn test_first_attempt_succeeds() {
        let model = ScriptedModel::new().with_reply(CallSite::Synthesis, ScriptedReply::text("7"));
        let options = CompletionOptions::new(CallSite::Synthesis);

        let (value, attempts) =
            call_structured(&model, &options, Duration::from_secs(1), build, parse)
                .await
                .unwrap();
        assert_eq!((value, attempts), (7, 1));
    }

    #[tokio::test]
    async fn test_malformed_then_strict_retry() {
        let model = ScriptedModel::new()
            .with_reply(CallSite::Synthesis, ScriptedReply::text("seven"))
            .with_reply(CallSite::Synthesis, ScriptedReply::text("7"));
        let options = CompletionOptions::new(CallSite::Synthesis);

        let (value, attempts) =
            call_structured(&model, &options, Duration::from_secs(1), build, parse)
                .await
                .unwrap();
        assert_eq!((value, attempts), (7, 2));

        let calls = model.calls();
        assert!(calls[1].prompt.starts_with("STRICT"));
        assert!(calls[1].prompt.contains("invalid digit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_twice_fails() {
        let model = ScriptedModel::new().with_default(
            CallSite::Synthesis,
            ScriptedReply::Delay(Duration::from_secs(10), "7".to_string()),
        );
        let options = CompletionOptions::new(CallSite::Synthesis);

        let result =
            call_structured(&model, &options, Duration::from_millis(50), build, parse).await;

        assert!(matches!(result, Err(CallFailure::Timeout(_))));
        assert_eq!(model.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_collaborator_error_is_retried_once() {
        let model = ScriptedModel::new()
            .with_default(CallSite::Synthesis, ScriptedReply::Error("down".to_string()));
        let options = CompletionOptions::new(CallSite::Synthesis);

        let result = call_structured(&model, &options, Duration::from_secs(1), build, parse).await;
        assert!(matches!(result, Err(CallFailure::Collaborator(_))));
        assert_eq!(model.calls().len(), 2);
    }
}
