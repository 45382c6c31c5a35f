use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::settings::ModelConfig;
use crate::models::chat::ModelRequestPayload;
use crate::payload::sanitizer;
use crate::utils::error::ApiError;

use super::conversation::ModelClient;

/// HTTP client for the Groq OpenAI-compatible completion endpoint.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    config: ModelConfig,
}

impl GroqClient {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Generate completion without streaming (wait for full response)
    pub async fn generate_chat(&self, payload: &ModelRequestPayload) -> Result<String, ApiError> {
        debug!(
            "Calling model {} with {} messages",
            payload.model,
            payload.messages.len()
        );

        // Last shape check before the wire. The builder only emits
        // role+content pairs, so a failure here means an upstream bug.
        let raw: Vec<serde_json::Value> = payload
            .messages
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();
        if raw.len() != payload.messages.len() || !sanitizer::validate(&raw) {
            warn!("Outbound payload failed shape validation");
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| ApiError::ModelError(format!("Failed to call model API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::ModelError(format!(
                "Model API error: {} - {}",
                status, body
            )));
        }

        #[derive(Deserialize)]
        struct ChatCompletionResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::ModelError(format!("Failed to parse model response: {}", e)))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ApiError::ModelError("No choices returned from model".to_string()))
    }
}

#[async_trait::async_trait]
impl ModelClient for GroqClient {
    async fn complete(&self, payload: &ModelRequestPayload) -> Result<String, ApiError> {
        self.generate_chat(payload).await
    }
}
