//! Command dispatch to the external assistant

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, Result};

/// Fixed instruction appended to every dispatched command
const SYSTEM_INSTRUCTION: &str =
    "Respond concisely, as a helpful AI assistant, and keep it short.";

/// Canned response when the command transcript was empty
const EMPTY_INPUT_RESPONSE: &str = "Sorry, I couldn't hear your command.";

/// External conversational assistant (single synchronous request/response)
#[async_trait]
pub trait AssistantCompletion: Send + Sync {
    /// Complete a prompt and return the response text
    ///
    /// # Errors
    ///
    /// Returns error on timeout, transport failure, or a malformed response
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// How one command cycle concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The assistant produced a response
    Success,
    /// Transcript was empty; the assistant was never invoked
    EmptyInput,
    /// The assistant call failed; the response is a fallback explanation
    CollaboratorError,
}

/// One command cycle: input transcript, response text, and outcome
#[derive(Debug, Clone)]
pub struct CommandExchange {
    /// The transcribed command
    pub input: String,
    /// Response text to show and speak
    pub response: String,
    /// How the exchange concluded
    pub outcome: CommandOutcome,
}

/// Sends transcribed commands to the assistant collaborator
pub struct CommandDispatcher {
    assistant: Arc<dyn AssistantCompletion>,
}

impl CommandDispatcher {
    /// Create a dispatcher over the given assistant
    #[must_use]
    pub fn new(assistant: Arc<dyn AssistantCompletion>) -> Self {
        Self { assistant }
    }

    /// Dispatch one command transcript
    ///
    /// Empty or whitespace-only input short-circuits without touching the
    /// assistant. Collaborator failures are folded into the exchange as a
    /// fallback response rather than propagated.
    pub async fn dispatch(&self, transcript: &str) -> CommandExchange {
        let input = transcript.trim();
        if input.is_empty() {
            return CommandExchange {
                input: String::new(),
                response: EMPTY_INPUT_RESPONSE.to_string(),
                outcome: CommandOutcome::EmptyInput,
            };
        }

        let prompt = format!("{input}\n\n{SYSTEM_INSTRUCTION}");
        match self.assistant.complete(&prompt).await {
            Ok(response) => {
                tracing::info!(command = %input, "command dispatched");
                CommandExchange {
                    input: input.to_string(),
                    response: response.trim().to_string(),
                    outcome: CommandOutcome::Success,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, command = %input, "assistant call failed");
                CommandExchange {
                    input: input.to_string(),
                    response: format!("The assistant is unavailable right now: {e}"),
                    outcome: CommandOutcome::CollaboratorError,
                }
            }
        }
    }
}

/// Stands in when no assistant credential is configured
///
/// Every completion fails, so the dispatcher folds it into its
/// collaborator-error fallback and the gate keeps running.
pub struct UnconfiguredAssistant;

#[async_trait]
impl AssistantCompletion for UnconfiguredAssistant {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::Assistant("Gemini not configured".to_string()))
    }
}

/// Assistant completion via the Gemini `generateContent` API
pub struct GeminiAssistant {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(serde::Serialize)]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
}

#[derive(serde::Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiPart<'a>>,
}

#[derive(serde::Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(serde::Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(serde::Deserialize)]
struct GeminiCandidate {
    content: GeminiCandidateContent,
}

#[derive(serde::Deserialize)]
struct GeminiCandidateContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(serde::Deserialize)]
struct GeminiResponsePart {
    text: String,
}

impl GeminiAssistant {
    /// Create a new Gemini client
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Gemini API key required for the assistant".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl AssistantCompletion for GeminiAssistant {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Assistant(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        let result: GeminiResponse = response.json().await?;
        let text = result
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| Error::Assistant("empty Gemini response".to_string()))?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAssistant {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingAssistant {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait]
    impl AssistantCompletion for CountingAssistant {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Assistant("simulated outage".to_string()));
            }
            assert!(prompt.contains(SYSTEM_INSTRUCTION));
            Ok("done".to_string())
        }
    }

    #[tokio::test]
    async fn test_empty_input_never_calls_assistant() {
        let assistant = CountingAssistant::new(false);
        let dispatcher = CommandDispatcher::new(assistant.clone());

        for input in ["", "   ", "\t\n"] {
            let exchange = dispatcher.dispatch(input).await;
            assert_eq!(exchange.outcome, CommandOutcome::EmptyInput);
            assert_eq!(exchange.response, EMPTY_INPUT_RESPONSE);
        }

        assert_eq!(assistant.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_dispatch() {
        let assistant = CountingAssistant::new(false);
        let dispatcher = CommandDispatcher::new(assistant.clone());

        let exchange = dispatcher.dispatch("open the pod bay doors").await;
        assert_eq!(exchange.outcome, CommandOutcome::Success);
        assert_eq!(exchange.response, "done");
        assert_eq!(exchange.input, "open the pod bay doors");
        assert_eq!(assistant.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unconfigured_assistant_yields_collaborator_error() {
        let dispatcher = CommandDispatcher::new(Arc::new(UnconfiguredAssistant));

        let exchange = dispatcher.dispatch("turn on the lights").await;
        assert_eq!(exchange.outcome, CommandOutcome::CollaboratorError);
        assert!(exchange.response.contains("Gemini not configured"));
    }

    #[tokio::test]
    async fn test_collaborator_failure_becomes_fallback_response() {
        let assistant = CountingAssistant::new(true);
        let dispatcher = CommandDispatcher::new(assistant);

        let exchange = dispatcher.dispatch("what time is it").await;
        assert_eq!(exchange.outcome, CommandOutcome::CollaboratorError);
        assert!(exchange.response.contains("unavailable"));
    }
}
