//! Anthropic Claude provider implementation

use super::openai::retry_after_secs;
use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> matchreport_error::Result<Self> {
        let client = http_client(&config, 120)?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com/v1")
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let model = request.model.as_deref().unwrap_or(self.default_model());
        let api_request = AnthropicRequest::build(model, &request);

        let api_key = self.config.api_key.as_ref()
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self.client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&api_request);

        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", "2023-06-01");
        }

        let response = req.send().await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = retry_after_secs(response.headers());
            let text = response.text().await.unwrap_or_default();

            if status == 429 {
                return Err(ProviderError::RateLimited { retry_after });
            } else if status == 401 {
                return Err(ProviderError::AuthenticationFailed);
            }

            return Err(ProviderError::Api { status, message: text });
        }

        let api_response: AnthropicResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(api_response.into_completion())
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl AnthropicRequest {
    /// System messages go to the top-level `system` field; the rest keep their order.
    fn build(model: &str, request: &CompletionRequest) -> Self {
        let mut system: Option<String> = None;
        let mut messages = Vec::new();
        for msg in &request.messages {
            match msg.role {
                Role::System => match &mut system {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system = Some(msg.content.clone()),
                },
                Role::User | Role::Assistant => messages.push(AnthropicMessage {
                    role: msg.role.as_str().into(),
                    content: msg.content.clone(),
                }),
            }
        }

        Self {
            model: model.to_string(),
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

impl AnthropicResponse {
    fn into_completion(self) -> CompletionResponse {
        let content: String = self.content.iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect();

        let finish_reason = match self.stop_reason.as_deref() {
            Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
            Some("max_tokens") => FinishReason::Length,
            _ => FinishReason::Unknown,
        };

        let usage = Usage {
            prompt_tokens: self.usage.input_tokens,
            completion_tokens: self.usage.output_tokens,
            total_tokens: self.usage.input_tokens + self.usage.output_tokens,
        };

        CompletionResponse {
            id: self.id,
            model: self.model,
            content: if content.is_empty() { None } else { Some(content) },
            finish_reason,
            usage,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_lifts_system_prompt() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("You are a sports reporter"),
            ChatMessage::user("Facts"),
            ChatMessage::assistant("Draft"),
            ChatMessage::user("Expand by 60 words"),
        ])
        .with_max_tokens(2048);

        let api_request = AnthropicRequest::build("claude-sonnet-4-20250514", &request);
        assert_eq!(api_request.system.as_deref(), Some("You are a sports reporter"));
        assert_eq!(api_request.messages.len(), 3);
        assert_eq!(api_request.messages[1].role, "assistant");
        assert_eq!(api_request.max_tokens, 2048);
    }

    #[test]
    fn test_response_concatenates_text_blocks() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                { "type": "text", "text": "První část. " },
                { "type": "thinking", "thinking": "..." },
                { "type": "text", "text": "Druhá část." }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 400, "output_tokens": 350 }
        });

        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_completion();
        assert_eq!(completion.content.as_deref(), Some("První část. Druhá část."));
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.total_tokens, 750);
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_request() {
        let mut config = ProviderConfig::anthropic("");
        config.api_key = None;
        let provider = AnthropicProvider::new(config).unwrap();

        let result = provider.complete(CompletionRequest::new(vec![ChatMessage::user("hi")])).await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed)));
    }
}
