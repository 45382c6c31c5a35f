use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::logging::types::ActivityLogBuilder;
use crate::logging::{ActivityLog, ActivityLogger, ActivityStatus, ActivityType};
use crate::memory::action_context::ContextUpdate;
use crate::memory::{ActionContext, StoreRegistry};
use crate::models::chat::{ChatResponse, ModelRequestPayload, Role};
use crate::payload::{sanitizer, PayloadBuilder};
use crate::routing::{MessageClassifier, RouteDecision};
use crate::session::rate_limiter::RateLimitRejection;
use crate::session::{SessionLock, SessionRateLimiter};
use crate::utils::error::ApiError;
use crate::utils::Diagnostics;

/// Trait for the completion backend
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, payload: &ModelRequestPayload) -> Result<String, ApiError>;
}

/// Trait for the application command executor
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CommandRouter: Send + Sync {
    async fn route(
        &self,
        session_id: &str,
        text: &str,
        context: &ActionContext,
    ) -> Result<RouterOutcome, ApiError>;
}

/// What the command router produced for one command.
#[derive(Debug, Clone, Default)]
pub struct RouterOutcome {
    pub reply: String,
    /// Structured patch for the action context; `None` leaves it untouched.
    pub context_update: Option<ContextUpdate>,
}

/// Outcome of one turn, before HTTP encoding.
#[derive(Debug, Clone)]
pub enum TurnReply {
    Completed(ChatResponse),
    RateLimited(RateLimitRejection),
}

/// Orchestrates one assistant turn end to end.
///
/// Owns the order of operations: rate check first (stores untouched on
/// rejection), then everything else under the per-session lock. Chat and
/// action memory are only ever written on their own route, and a chat turn
/// is committed as one unit after the model answered.
pub struct ConversationService {
    registry: Arc<StoreRegistry>,
    locks: SessionLock,
    limiter: SessionRateLimiter,
    builder: PayloadBuilder,
    model: Box<dyn ModelClient>,
    router: Box<dyn CommandRouter>,
    logger: Arc<ActivityLogger>,
    diagnostics: Diagnostics,
    confirmation_ttl: chrono::Duration,
}

impl ConversationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<StoreRegistry>,
        locks: SessionLock,
        limiter: SessionRateLimiter,
        builder: PayloadBuilder,
        model: Box<dyn ModelClient>,
        router: Box<dyn CommandRouter>,
        logger: Arc<ActivityLogger>,
        diagnostics: Diagnostics,
        confirmation_ttl: chrono::Duration,
    ) -> Self {
        Self {
            registry,
            locks,
            limiter,
            builder,
            model,
            router,
            logger,
            diagnostics,
            confirmation_ttl,
        }
    }

    /// Handle one user turn for a session.
    pub async fn handle_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<TurnReply, ApiError> {
        let start_time = Instant::now();

        // Rate check runs before any store or lock is touched.
        let decision = self.limiter.check(session_id, user_id);
        if !decision.allowed {
            info!(
                session_id,
                retry_after = decision.retry_after_seconds(),
                "turn rejected by rate limiter"
            );
            self.logger.log(
                self.activity(session_id, user_id, ActivityType::RateLimited)
                    .status(ActivityStatus::Warning)
                    .build(),
            );
            return Ok(TurnReply::RateLimited(decision.rejection()));
        }

        self.logger.log(
            self.activity(session_id, user_id, ActivityType::TurnReceived)
                .status(ActivityStatus::Info)
                .message(text)
                .build(),
        );

        self.locks
            .with_lock(session_id, async {
                let classification = MessageClassifier::classify(text);
                debug!(
                    session_id,
                    decision = ?classification.decision,
                    confidence = classification.confidence,
                    "message classified"
                );

                match classification.decision {
                    RouteDecision::GeneralChat => {
                        self.chat_turn(session_id, user_id, text, start_time).await
                    }
                    RouteDecision::ActionCommand => {
                        self.action_turn(session_id, user_id, text, start_time).await
                    }
                    RouteDecision::Ambiguous => {
                        self.clarification_turn(session_id, user_id, text, start_time)
                            .await
                    }
                }
            })
            .await
    }

    /// General conversation: history plus the new text go to the model, and
    /// the turn is committed only once the model answered.
    async fn chat_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        text: &str,
        start_time: Instant,
    ) -> Result<TurnReply, ApiError> {
        let mut history = self.registry.chat(session_id).await?;

        let report = self.builder.build(&history, Some(text));
        if report.trimmed > 0 || report.screened > 0 {
            self.logger.log(
                self.activity(session_id, user_id, ActivityType::PayloadTrimmed)
                    .status(ActivityStatus::Warning)
                    .route("chat")
                    .turns_trimmed(report.trimmed as i32)
                    .turns_screened(report.screened as i32)
                    .build(),
            );
        }

        let payload = self.checked_payload(session_id, user_id, report.payload);
        let token_count = payload.estimated_tokens(self.builder.config().chars_per_token) as i32;

        let model_start = Instant::now();
        let reply = match self.call_model_with_retry(&payload).await {
            Ok(reply) => reply,
            Err(e) => {
                self.logger.log(
                    self.activity(session_id, user_id, ActivityType::ModelError)
                        .route("chat")
                        .error(e.to_string(), "model")
                        .build(),
                );
                return Err(e);
            }
        };
        let model_duration = model_start.elapsed().as_millis() as i32;

        // Commit the user turn and the reply together, now that the model
        // answered. A failed call above leaves the history untouched.
        self.record_turn(session_id, user_id, &mut history, Role::User, text);
        self.record_turn(session_id, user_id, &mut history, Role::Assistant, &reply);
        self.registry.put_chat(&history).await?;

        self.logger.log(
            self.activity(session_id, user_id, ActivityType::TurnCompleted)
                .route("chat")
                .message(text)
                .response(&reply)
                .token_count(token_count)
                .processing_time(start_time.elapsed().as_millis() as i32)
                .model_duration(model_duration)
                .build(),
        );

        Ok(TurnReply::Completed(ChatResponse {
            session_id: session_id.to_string(),
            reply,
            kind: "chat".to_string(),
        }))
    }

    /// Application command: delegated to the router; only the action context
    /// may change, chat memory never does.
    async fn action_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        text: &str,
        start_time: Instant,
    ) -> Result<TurnReply, ApiError> {
        let mut context = self.registry.action(session_id).await?;

        let outcome = match self.router.route(session_id, text, &context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.logger.log(
                    self.activity(session_id, user_id, ActivityType::CommandRouted)
                        .route("action")
                        .error(e.to_string(), "router")
                        .build(),
                );
                return Err(e);
            }
        };

        if let Some(update) = outcome.context_update {
            context.apply(update, self.confirmation_ttl);
            let issues = context.validate();
            if issues.is_empty() {
                self.registry.put_action(&context).await?;
            } else {
                // Setters bound every field, so a failing check means a bug
                // upstream. Keep the stored context as it was.
                self.logger.log(
                    self.activity(session_id, user_id, ActivityType::InvariantViolation)
                        .route("action")
                        .error(issues.join("; "), "action_context")
                        .build(),
                );
                self.diagnostics
                    .invariant_violation("action_context", &issues.join("; "));
            }
        }

        self.logger.log(
            self.activity(session_id, user_id, ActivityType::CommandRouted)
                .route("action")
                .message(text)
                .response(&outcome.reply)
                .processing_time(start_time.elapsed().as_millis() as i32)
                .build(),
        );

        Ok(TurnReply::Completed(ChatResponse {
            session_id: session_id.to_string(),
            reply: outcome.reply,
            kind: "action".to_string(),
        }))
    }

    /// Ambiguous input: ask one clarifying question. Nothing is stored, so
    /// a follow-up restates its intent on a clean slate.
    async fn clarification_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        text: &str,
        start_time: Instant,
    ) -> Result<TurnReply, ApiError> {
        let history = self.registry.chat(session_id).await?;

        let report = self.builder.build_clarification(&history, Some(text));
        let payload = self.checked_payload(session_id, user_id, report.payload);

        let reply = match self.call_model_with_retry(&payload).await {
            Ok(reply) => reply,
            Err(e) => {
                self.logger.log(
                    self.activity(session_id, user_id, ActivityType::ModelError)
                        .route("clarification")
                        .error(e.to_string(), "model")
                        .build(),
                );
                return Err(e);
            }
        };

        self.logger.log(
            self.activity(session_id, user_id, ActivityType::ClarificationIssued)
                .route("clarification")
                .message(text)
                .response(&reply)
                .processing_time(start_time.elapsed().as_millis() as i32)
                .build(),
        );

        Ok(TurnReply::Completed(ChatResponse {
            session_id: session_id.to_string(),
            reply,
            kind: "clarification".to_string(),
        }))
    }

    /// The builder only emits typed role+content pairs, so the sanitizer
    /// probe acts as a tripwire: any repair it performs is an invariant
    /// violation upstream, reported but not fatal in lenient mode.
    fn checked_payload(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        mut payload: ModelRequestPayload,
    ) -> ModelRequestPayload {
        let probe = sanitizer::sanitize_payload(&mut payload, false);
        if probe.was_modified {
            self.logger.log(
                self.activity(session_id, user_id, ActivityType::InvariantViolation)
                    .error(probe.issues.join("; "), "payload")
                    .build(),
            );
            self.diagnostics
                .invariant_violation("payload", &probe.issues.join("; "));
        }
        payload
    }

    async fn call_model_with_retry(
        &self,
        payload: &ModelRequestPayload,
    ) -> Result<String, ApiError> {
        const MAX_RETRIES: u32 = 3;

        for attempt in 1..=MAX_RETRIES {
            match self.model.complete(payload).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(tokio::time::Duration::from_secs(attempt as u64)).await;
                    } else {
                        error!("Model call failed after {} attempts: {}", MAX_RETRIES, e);
                        return Err(e);
                    }
                }
            }
        }

        unreachable!()
    }

    fn record_turn(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        history: &mut crate::memory::ChatHistory,
        role: Role,
        content: &str,
    ) {
        if let crate::memory::chat_history::AddOutcome::Rejected { reason } =
            history.add(role, content)
        {
            self.logger.log(
                self.activity(session_id, user_id, ActivityType::MemoryRejected)
                    .status(ActivityStatus::Warning)
                    .route("chat")
                    .message(format!("{} turn rejected: {}", role, reason))
                    .build(),
            );
        }
    }

    fn activity(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        activity_type: ActivityType,
    ) -> ActivityLogBuilder {
        let builder = ActivityLog::builder(session_id, activity_type);
        match user_id {
            Some(uid) => builder.user_id(uid),
            None => builder,
        }
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn lock_stats(&self) -> crate::session::lock::LockStats {
        self.locks.stats()
    }

    pub fn limiter_stats(&self) -> crate::session::rate_limiter::RateLimiterStats {
        self.limiter.stats()
    }

    pub fn logger(&self) -> &ActivityLogger {
        &self.logger
    }
}
