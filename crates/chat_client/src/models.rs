//! Request and response bodies of the chat API.

use chat_core::ChatMessage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub provider: String,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
    ) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            messages,
            stream: false,
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelInfo>,
}

impl ModelsResponse {
    /// Distinct providers in the order the server lists them.
    pub fn providers(&self) -> Vec<&str> {
        let mut providers: Vec<&str> = Vec::new();
        for model in &self.models {
            if !providers.contains(&model.provider.as_str()) {
                providers.push(model.provider.as_str());
            }
        }
        providers
    }

    pub fn models_for<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a ModelInfo> {
        self.models.iter().filter(move |m| m.provider == provider)
    }

    /// The selection a fresh conversation starts with: the first listed model.
    pub fn default_selection(&self) -> Option<&ModelInfo> {
        self.models.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, provider: &str) -> ModelInfo {
        ModelInfo {
            id: id.to_string(),
            provider: provider.to_string(),
            name: id.to_uppercase(),
        }
    }

    #[test]
    fn streaming_request_serializes_flag() {
        let request =
            ChatRequest::new("openai", "gpt-4o", vec![ChatMessage::user("hi")]).streaming();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "provider": "openai",
                "model": "gpt-4o",
                "messages": [{"role": "user", "content": "hi"}],
                "stream": true,
            })
        );
    }

    #[test]
    fn plain_request_omits_stream_flag() {
        let request = ChatRequest::new("ark", "doubao", vec![]);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("stream").is_none());
    }

    #[test]
    fn chat_response_usage_is_optional() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"content":"ok","model":"m"}"#).unwrap();
        assert!(response.usage.is_none());
    }

    #[test]
    fn providers_keep_first_seen_order() {
        let response = ModelsResponse {
            models: vec![
                model("doubao", "ark"),
                model("gpt-4o", "openai"),
                model("doubao-lite", "ark"),
            ],
        };

        assert_eq!(response.providers(), vec!["ark", "openai"]);
        let ark: Vec<_> = response.models_for("ark").map(|m| m.id.as_str()).collect();
        assert_eq!(ark, vec!["doubao", "doubao-lite"]);
        assert_eq!(response.default_selection().map(|m| m.id.as_str()), Some("doubao"));
    }
}
