pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// LLM provider types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum LLMProvider {
    OpenAI,
    OpenRouter,
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::OpenAI,
            endpoint: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.7,
            timeout_seconds: 120,
        }
    }
}

/// Chat message for LLM communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Per-request overrides for generation settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: String,
    pub tokens_used: Option<u32>,
}

/// Trait for LLM providers
#[async_trait]
pub trait LLM: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LLMResponse> {
        self.chat_with_options(messages, ChatOptions::default())
            .await
    }
    async fn chat_with_options(
        &self,
        messages: Vec<ChatMessage>,
        options: ChatOptions,
    ) -> Result<LLMResponse>;
    async fn is_available(&self) -> bool;
    fn provider_type(&self) -> LLMProvider;
}

/// Create LLM instance based on configuration
pub fn create_llm(config: &LLMConfig) -> Result<Box<dyn LLM>> {
    match config.provider {
        LLMProvider::OpenAI => Ok(Box::new(providers::OpenAIProvider::new(config.clone())?)),
        LLMProvider::OpenRouter => {
            Ok(Box::new(providers::OpenRouterProvider::new(config.clone())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = ChatMessage::system("You are an expert screenwriter for audio dramas.");
        assert_eq!(system.role, "system");
        let user = ChatMessage::user("Write the scene.");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "Write the scene.");
    }

    #[test]
    fn test_factory_requires_api_key() {
        let config = LLMConfig::default();
        assert!(create_llm(&config).is_err());

        let config = LLMConfig {
            api_key: Some("test-key".to_string()),
            ..Default::default()
        };
        let llm = create_llm(&config).unwrap();
        assert_eq!(llm.provider_type(), LLMProvider::OpenAI);
    }
}
