use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("{0}")]
    Validation(String),
    #[error("AI service error: {0}")]
    Service(String),
    #[error("AI response contained no text")]
    EmptyResponse,
    #[error("http error: {0}")]
    Http(String),
}

/// Opaque text-completion service: one prompt in, free text out.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AiError>;
}

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u32 = 8192;
const SYSTEM_PROMPT: &str = "You are a meticulous music festival researcher. Only report festivals and dates you are confident about. Answer with JSON only.";

#[derive(Debug, Clone, PartialEq)]
pub struct AiSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl AiSettings {
    /// Stored config first, then `FESTIMAP_AI_*` environment overrides.
    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = Self::default();
        let endpoint = std::env::var("FESTIMAP_AI_ENDPOINT")
            .ok()
            .or_else(|| config.ai_endpoint.clone())
            .unwrap_or(defaults.endpoint);
        let model = std::env::var("FESTIMAP_AI_MODEL")
            .ok()
            .or_else(|| config.ai_model.clone())
            .unwrap_or(defaults.model);
        let temperature = std::env::var("FESTIMAP_AI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .or(config.ai_temperature)
            .unwrap_or(defaults.temperature);
        let max_tokens = std::env::var("FESTIMAP_AI_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .or(config.ai_max_tokens)
            .unwrap_or(defaults.max_tokens);

        Self {
            endpoint,
            model,
            temperature,
            max_tokens,
        }
    }
}

/// OpenAI-compatible chat-completions client. No client-side timeout is set,
/// a request runs until the transport gives up.
pub struct AiClient {
    settings: AiSettings,
    api_key: String,
    client: Client,
}

impl AiClient {
    pub fn new(settings: AiSettings, api_key: &str) -> Result<Self, AiError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AiError::Validation("an AI API key is required".into()));
        }
        Ok(Self {
            settings,
            api_key: api_key.to_string(),
            client: Client::new(),
        })
    }

    pub fn settings(&self) -> &AiSettings {
        &self.settings
    }

    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.settings.model,
            "temperature": self.settings.temperature,
            "max_tokens": self.settings.max_tokens,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
        })
    }
}

#[async_trait]
impl TextCompletion for AiClient {
    async fn complete(&self, prompt: &str) -> Result<String, AiError> {
        let base = self.settings.endpoint.trim_end_matches('/');
        let url = format!("{}/chat/completions", base);
        log::info!("sending AI request to {url} (model {})", self.settings.model);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.payload(prompt))
            .send()
            .await
            .map_err(|err| AiError::Http(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AiError::Http(err.to_string()))?;

        if !status.is_success() {
            let message = service_message(&body);
            log::error!("AI request failed with HTTP {status}: {message}");
            return Err(AiError::Service(format!("HTTP {}: {}", status.as_u16(), message)));
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|err| AiError::Http(err.to_string()))?;
        completion_text(&value)
    }
}

/// The provider's own error message when it sent one, else the raw body.
fn service_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.get("message").or(Some(error)))
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

fn completion_text(value: &Value) -> Result<String, AiError> {
    value
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(AiError::EmptyResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_requires_a_key() {
        assert!(matches!(
            AiClient::new(AiSettings::default(), "   "),
            Err(AiError::Validation(_))
        ));
        assert!(AiClient::new(AiSettings::default(), "sk-test").is_ok());
    }

    #[test]
    fn payload_carries_sampling_parameters() {
        let settings = AiSettings {
            temperature: 0.3,
            max_tokens: 1024,
            ..AiSettings::default()
        };
        let client = AiClient::new(settings, "sk-test").expect("client");
        let payload = client.payload("find festivals");
        assert_eq!(payload["max_tokens"], 1024);
        assert_eq!(payload["messages"][1]["content"], "find festivals");
        assert_eq!(payload["temperature"], 0.3);
    }

    #[test]
    fn default_temperature_is_sent_exactly() {
        let client = AiClient::new(AiSettings::default(), "sk-test").expect("client");
        let body = serde_json::to_string(&client.payload("check dates")).expect("serialize");
        assert!(body.contains("\"temperature\":0.7"), "{body}");
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let value = json!({"choices": [{"message": {"content": "  {\"festivals\": []}  "}}]});
        assert_eq!(completion_text(&value).expect("text"), "{\"festivals\": []}");
    }

    #[test]
    fn blank_or_missing_content_is_empty_response() {
        let blank = json!({"choices": [{"message": {"content": "   "}}]});
        assert!(matches!(completion_text(&blank), Err(AiError::EmptyResponse)));
        let none = json!({"choices": []});
        assert!(matches!(completion_text(&none), Err(AiError::EmptyResponse)));
    }

    #[test]
    fn service_message_prefers_provider_error() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(service_message(body), "Incorrect API key provided");
        assert_eq!(service_message(r#"{"error": "quota exceeded"}"#), "quota exceeded");
        assert_eq!(service_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn settings_fall_back_to_stored_config() {
        let config = AppConfig {
            ai_model: Some("local-model".into()),
            ai_max_tokens: Some(2048),
            ..AppConfig::default()
        };
        let settings = AiSettings::from_config(&config);
        if std::env::var("FESTIMAP_AI_MODEL").is_err() {
            assert_eq!(settings.model, "local-model");
        }
        if std::env::var("FESTIMAP_AI_MAX_TOKENS").is_err() {
            assert_eq!(settings.max_tokens, 2048);
        }
    }
}
