use serde::{Deserialize, Serialize};

use crate::core::config::LlmConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i32>,
    pub stop: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
            stop: None,
        }
    }

    pub fn with_config(mut self, config: &LlmConfig) -> Self {
        self.temperature = config.temperature.or(self.temperature);
        self.max_tokens = config.max_tokens.or(self.max_tokens);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_fills_sampling_options() {
        let config = LlmConfig {
            temperature: Some(0.2),
            max_tokens: Some(256),
            ..LlmConfig::default()
        };

        let request = ChatRequest::new(vec![ChatMessage::user("hi")]).with_config(&config);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(256));
        assert_eq!(request.messages[0].role, "user");
    }
}
