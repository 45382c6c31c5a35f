use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity type categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    TurnReceived,
    TurnCompleted,
    CommandRouted,
    ClarificationIssued,
    RateLimited,
    MemoryRejected,
    PayloadTrimmed,
    InvariantViolation,
    ModelError,
    StoresReset,
}

impl ActivityType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::TurnReceived => "turn_received",
            Self::TurnCompleted => "turn_completed",
            Self::CommandRouted => "command_routed",
            Self::ClarificationIssued => "clarification_issued",
            Self::RateLimited => "rate_limited",
            Self::MemoryRejected => "memory_rejected",
            Self::PayloadTrimmed => "payload_trimmed",
            Self::InvariantViolation => "invariant_violation",
            Self::ModelError => "model_error",
            Self::StoresReset => "stores_reset",
        }
    }
}

/// Activity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Success,
    Error,
    Warning,
    Info,
}

impl ActivityStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// Complete activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    // Session & User
    pub session_id: String,
    pub user_id: Option<String>,

    // Activity
    pub activity_type: ActivityType,
    pub activity_status: ActivityStatus,

    // Context
    pub route: Option<String>,
    pub message_content: Option<String>,
    pub response_content: Option<String>,

    // Metrics
    pub token_count: Option<i32>,
    pub turns_trimmed: Option<i32>,
    pub turns_screened: Option<i32>,

    // Performance
    pub processing_time_ms: Option<i32>,
    pub model_duration_ms: Option<i32>,

    // Error
    pub error_message: Option<String>,
    pub error_type: Option<String>,

    // Timestamp
    pub created_at: DateTime<Utc>,
}

impl ActivityLog {
    /// Create builder for fluent API
    pub fn builder(session_id: impl Into<String>, activity_type: ActivityType) -> ActivityLogBuilder {
        ActivityLogBuilder::new(session_id, activity_type)
    }
}

/// Builder pattern for ActivityLog
pub struct ActivityLogBuilder {
    log: ActivityLog,
}

impl ActivityLogBuilder {
    pub fn new(session_id: impl Into<String>, activity_type: ActivityType) -> Self {
        Self {
            log: ActivityLog {
                session_id: session_id.into(),
                user_id: None,
                activity_type,
                activity_status: ActivityStatus::Success,
                route: None,
                message_content: None,
                response_content: None,
                token_count: None,
                turns_trimmed: None,
                turns_screened: None,
                processing_time_ms: None,
                model_duration_ms: None,
                error_message: None,
                error_type: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.log.user_id = Some(user_id.into());
        self
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.log.activity_status = status;
        self
    }

    pub fn route(mut self, route: impl Into<String>) -> Self {
        self.log.route = Some(route.into());
        self
    }

    pub fn message(mut self, content: impl Into<String>) -> Self {
        self.log.message_content = Some(content.into());
        self
    }

    pub fn response(mut self, content: impl Into<String>) -> Self {
        self.log.response_content = Some(content.into());
        self
    }

    pub fn token_count(mut self, count: i32) -> Self {
        self.log.token_count = Some(count);
        self
    }

    pub fn turns_trimmed(mut self, count: i32) -> Self {
        self.log.turns_trimmed = Some(count);
        self
    }

    pub fn turns_screened(mut self, count: i32) -> Self {
        self.log.turns_screened = Some(count);
        self
    }

    pub fn processing_time(mut self, ms: i32) -> Self {
        self.log.processing_time_ms = Some(ms);
        self
    }

    pub fn model_duration(mut self, ms: i32) -> Self {
        self.log.model_duration_ms = Some(ms);
        self
    }

    pub fn error(mut self, message: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.log.error_message = Some(message.into());
        self.log.error_type = Some(error_type.into());
        self.log.activity_status = ActivityStatus::Error;
        self
    }

    pub fn build(self) -> ActivityLog {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_and_setters() {
        let log = ActivityLog::builder("s1", ActivityType::TurnCompleted)
            .user_id("u1")
            .route("chat")
            .token_count(120)
            .processing_time(45)
            .build();

        assert_eq!(log.session_id, "s1");
        assert_eq!(log.user_id.as_deref(), Some("u1"));
        assert_eq!(log.activity_status, ActivityStatus::Success);
        assert_eq!(log.token_count, Some(120));
    }

    #[test]
    fn test_error_setter_flips_status() {
        let log = ActivityLog::builder("s1", ActivityType::ModelError)
            .error("gateway timeout", "model")
            .build();
        assert_eq!(log.activity_status, ActivityStatus::Error);
        assert_eq!(log.error_type.as_deref(), Some("model"));
    }

    #[test]
    fn test_serializes_snake_case() {
        let log = ActivityLog::builder("s1", ActivityType::RateLimited).build();
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["activity_type"], "rate_limited");
        assert_eq!(json["activity_status"], "success");
    }
}
