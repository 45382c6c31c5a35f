use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::token_estimator;

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    /// "chat", "action" or "clarification"
    pub kind: String,
}

// ===== CONVERSATION DOMAIN =====

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored conversational message, scoped to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: Uuid,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Approximate model-token cost, fixed at insertion time.
    pub token_estimate: usize,
}

impl ChatTurn {
    pub fn new(session_id: &str, role: Role, content: &str, chars_per_token: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
            token_estimate: token_estimator::estimate_tokens(content, chars_per_token),
        }
    }
}

// ===== MODEL PAYLOAD =====

/// One outbound message in the exact shape the model gateway expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub role: Role,
    pub content: String,
}

impl PayloadMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Complete request body for the chat-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequestPayload {
    pub model: String,
    pub messages: Vec<PayloadMessage>,
    pub temperature: f32,
    #[serde(rename = "max_tokens")]
    pub max_output_tokens: u32,
    pub stream: bool,
}

impl ModelRequestPayload {
    /// Sum of estimated tokens across all messages.
    pub fn estimated_tokens(&self, chars_per_token: usize) -> usize {
        self.messages
            .iter()
            .map(|m| token_estimator::estimate_tokens(&m.content, chars_per_token))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
    }

    #[test]
    fn test_payload_uses_wire_field_name() {
        let payload = ModelRequestPayload {
            model: "llama-3.3-70b-versatile".to_string(),
            messages: vec![PayloadMessage::new(Role::User, "salut")],
            temperature: 0.7,
            max_output_tokens: 1024,
            stream: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["max_tokens"], 1024);
        assert!(json.get("max_output_tokens").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_turn_estimate_fixed_at_insert() {
        let turn = ChatTurn::new("s1", Role::User, "douze lettres", 4);
        assert_eq!(turn.token_estimate, 4); // 13 graphemes / 4 rounded up
    }
}
