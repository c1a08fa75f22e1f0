//! Report generation capability
//!
//! The agent never talks to a model directly. It hands a [`GenerationRequest`]
//! to whatever [`ReportGenerator`] it was built with: a real provider through
//! [`ProviderGenerator`], or a closure through [`FnGenerator`] in tests.

use matchreport_error::{Error, Result};
use matchreport_llm::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use tracing::debug;

use crate::config::AgentConfig;
use crate::facts::FactSet;
use crate::length::LengthVerdict;
use crate::prompt::PromptBuilder;

/// A rejected draft and what to change about it
#[derive(Debug, Clone)]
pub struct Revision {
    pub draft: String,
    pub verdict: LengthVerdict,
    pub feedback: String,
}

/// Everything the generator gets for one attempt
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub facts: &'a FactSet,
    /// 1-based attempt number
    pub attempt: usize,
    /// Present on retries
    pub revision: Option<&'a Revision>,
}

/// Produces report text from facts and optional revision feedback.
#[allow(async_fn_in_trait)]
pub trait ReportGenerator {
    async fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String>;
}

/// Adapts a closure into a [`ReportGenerator`].
pub struct FnGenerator<F>(F);

impl<F> FnGenerator<F>
where
    F: FnMut(&GenerationRequest<'_>) -> Result<String>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ReportGenerator for FnGenerator<F>
where
    F: FnMut(&GenerationRequest<'_>) -> Result<String>,
{
    async fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String> {
        (self.0)(request)
    }
}

/// Generates reports through an [`LlmProvider`].
pub struct ProviderGenerator<P> {
    provider: P,
    prompts: PromptBuilder,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: usize,
    usage: UsageTracker,
}

impl<P: LlmProvider> ProviderGenerator<P> {
    pub fn new(provider: P, config: &AgentConfig) -> Self {
        Self {
            provider,
            prompts: PromptBuilder::new(config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            usage: UsageTracker::new(),
        }
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Conversation for one attempt: facts first, then the rejected draft and
    /// the correction when revising.
    pub fn messages(&self, request: &GenerationRequest<'_>) -> Result<Vec<ChatMessage>> {
        let mut messages = vec![
            ChatMessage::system(self.prompts.system_prompt()),
            ChatMessage::user(self.prompts.facts_prompt(request.facts)?),
        ];
        if let Some(revision) = request.revision {
            messages.push(ChatMessage::assistant(revision.draft.clone()));
            messages.push(ChatMessage::user(self.prompts.revision_prompt(&revision.feedback)));
        }
        Ok(messages)
    }
}

impl<P: LlmProvider> ReportGenerator for ProviderGenerator<P> {
    async fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<String> {
        let mut completion = CompletionRequest::new(self.messages(request)?)
            .with_max_tokens(self.max_tokens);
        if let Some(model) = &self.model {
            completion = completion.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            completion = completion.with_temperature(temperature);
        }

        debug!(
            provider = self.provider.name(),
            attempt = request.attempt,
            messages = completion.messages.len(),
            "requesting draft"
        );

        let response = self.provider.complete(completion).await.map_err(|e| {
            e.into_error(self.provider.name())
                .with_operation("generator::generate")
                .with_context("attempt", request.attempt.to_string())
        })?;

        self.usage.track(&response.model, &response.usage);

        let text = response.content.unwrap_or_default();
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::inference_failed("model returned an empty draft")
                .with_operation("generator::generate")
                .with_context("provider", self.provider.name())
                .with_context("attempt", request.attempt.to_string()));
        }
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::extract_facts;
    use crate::length::LengthGate;
    use matchreport_error::ErrorKind;
    use matchreport_llm::{CompletionResponse, FinishReason, ProviderError, Role, Usage};
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned replies and records every request it sees
    struct ScriptedProvider {
        replies: Mutex<Vec<std::result::Result<String, ProviderError>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<std::result::Result<String, ProviderError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-1"
        }

        async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
            self.seen.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().remove(0)?;
            Ok(CompletionResponse {
                id: "1".into(),
                model: "scripted-1".into(),
                content: Some(reply),
                finish_reason: FinishReason::Stop,
                usage: Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 },
            })
        }
    }

    fn facts() -> FactSet {
        extract_facts(&json!({
            "date": "2024-05-01",
            "home_team": { "name": "Sparta", "score": 2 },
            "away_team": { "name": "Slavia", "score": 1 }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_attempt_messages() {
        let provider = ScriptedProvider::new(vec![Ok("  Sparta vyhrála.  ".into())]);
        let mut generator = ProviderGenerator::new(provider, &AgentConfig::default());
        let facts = facts();

        let text = generator
            .generate(&GenerationRequest { facts: &facts, attempt: 1, revision: None })
            .await
            .unwrap();
        assert_eq!(text, "Sparta vyhrála.");
        assert_eq!(generator.usage().total_calls, 1);

        let seen = generator.provider().seen.lock().unwrap();
        assert_eq!(seen[0].messages.len(), 2);
        assert_eq!(seen[0].messages[0].role, Role::System);
        assert_eq!(seen[0].max_tokens, Some(2048));
    }

    #[tokio::test]
    async fn test_revision_appends_draft_and_feedback() {
        let provider = ScriptedProvider::new(vec![Ok("delší text".into())]);
        let config = AgentConfig {
            model: Some("gpt-4o-mini".into()),
            ..AgentConfig::default()
        };
        let mut generator = ProviderGenerator::new(provider, &config);
        let facts = facts();
        let verdict = LengthGate::default().check("krátký text");
        let revision = Revision {
            draft: "krátký text".into(),
            feedback: verdict.feedback().unwrap(),
            verdict,
        };

        generator
            .generate(&GenerationRequest { facts: &facts, attempt: 2, revision: Some(&revision) })
            .await
            .unwrap();

        let seen = generator.provider().seen.lock().unwrap();
        let messages = &seen[0].messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], ChatMessage::assistant("krátký text"));
        assert!(messages[3].content.contains("Expand it by at least 258 words"));
        assert_eq!(seen[0].model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_inference_failure() {
        let provider = ScriptedProvider::new(vec![Ok("   ".into())]);
        let mut generator = ProviderGenerator::new(provider, &AgentConfig::default());
        let facts = facts();

        let err = generator
            .generate(&GenerationRequest { facts: &facts, attempt: 1, revision: None })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_provider_error_is_wrapped() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::RateLimited { retry_after: None })]);
        let mut generator = ProviderGenerator::new(provider, &AgentConfig::default());
        let facts = facts();

        let err = generator
            .generate(&GenerationRequest { facts: &facts, attempt: 1, revision: None })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.operation(), "generator::generate");
        assert!(err.context().contains(&("called", "provider::complete".to_string())));
    }

    #[tokio::test]
    async fn test_fn_generator() {
        let mut calls = 0;
        let mut generator = FnGenerator::new(|request: &GenerationRequest<'_>| {
            calls += 1;
            Ok(format!("{} vs {}", request.facts.home_team.name, request.facts.away_team.name))
        });
        let facts = facts();
        let text = generator
            .generate(&GenerationRequest { facts: &facts, attempt: 1, revision: None })
            .await
            .unwrap();
        assert_eq!(text, "Sparta vs Slavia");
        drop(generator);
        assert_eq!(calls, 1);
    }
}
