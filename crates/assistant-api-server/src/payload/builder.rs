use std::collections::VecDeque;

use tracing::debug;

use crate::memory::chat_history::ChatHistory;
use crate::memory::pollution::{self, FilterTier};
use crate::models::chat::{ChatTurn, ModelRequestPayload, PayloadMessage, Role};
use crate::utils::token_estimator;

use super::model_limits;

/// Builder knobs, fixed at startup from settings.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub model: String,
    pub temperature: f32,
    /// Requested completion size; capped to the model maximum at build time.
    pub max_output_tokens: u32,
    /// Soft ceiling on system prompt + history tokens.
    pub soft_token_limit: usize,
    pub chars_per_token: usize,
    pub system_prompt: String,
    pub clarification_prompt: String,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.7,
            max_output_tokens: 1024,
            soft_token_limit: 4000,
            chars_per_token: 4,
            system_prompt: "Tu es l'assistant intégré de l'application de gestion de projets. \
                            Réponds de façon concise et utile, en français sauf si l'utilisateur \
                            écrit dans une autre langue."
                .to_string(),
            clarification_prompt: "Tu es l'assistant intégré de l'application de gestion de \
                                   projets. La dernière demande de l'utilisateur est ambiguë. \
                                   Pose UNE seule question courte pour clarifier ce qu'il veut \
                                   faire. Ne réponds à rien d'autre."
                .to_string(),
        }
    }
}

/// What one build produced, with counters for activity logging.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub payload: ModelRequestPayload,
    /// History turns dropped oldest-first to fit the token budget.
    pub trimmed: usize,
    /// History turns skipped by the action-output screen.
    pub screened: usize,
    /// Whether the just-arrived user text made it into the payload.
    pub current_included: bool,
}

/// Assembles outbound model payloads from chat memory.
///
/// The system prompt always leads and the just-arrived user text always
/// closes the list; neither is ever trimmed. History in between is dropped
/// oldest-first until the token budget holds. This is the only place that
/// trims a payload.
pub struct PayloadBuilder {
    config: BuilderConfig,
}

impl PayloadBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build a conversational payload: system prompt, budget-fitted history,
    /// then the current user text.
    pub fn build(&self, history: &ChatHistory, current_text: Option<&str>) -> BuildReport {
        self.assemble(&self.config.system_prompt, history, current_text)
    }

    /// Same mechanics with the clarification-seeking system prompt.
    pub fn build_clarification(
        &self,
        history: &ChatHistory,
        current_text: Option<&str>,
    ) -> BuildReport {
        self.assemble(&self.config.clarification_prompt, history, current_text)
    }

    fn assemble(
        &self,
        system_prompt: &str,
        history: &ChatHistory,
        current_text: Option<&str>,
    ) -> BuildReport {
        let mut screened = 0usize;

        // Stored turns should already be clean; screen again anyway so a
        // stale or hand-migrated blob cannot leak action output outward.
        let mut surviving: VecDeque<&ChatTurn> = history
            .turns()
            .iter()
            .filter(|turn| {
                match pollution::detect(&turn.content, pollution::tier_for_role(turn.role)) {
                    Some(rule) => {
                        debug!(
                            session_id = %history.session_id,
                            turn_id = %turn.id,
                            rule = rule,
                            "screened stored turn out of payload"
                        );
                        screened += 1;
                        false
                    }
                    None => true,
                }
            })
            .collect();

        let system_tokens =
            token_estimator::estimate_tokens(system_prompt, self.config.chars_per_token);
        let mut total = system_tokens + surviving.iter().map(|t| t.token_estimate).sum::<usize>();

        let mut trimmed = 0usize;
        while total > self.config.soft_token_limit && surviving.len() > 2 {
            if let Some(dropped) = surviving.pop_front() {
                total -= dropped.token_estimate;
                trimmed += 1;
            } else {
                break;
            }
        }
        if trimmed > 0 {
            debug!(
                session_id = %history.session_id,
                trimmed = trimmed,
                total_tokens = total,
                "trimmed history to token budget"
            );
        }

        let mut messages = Vec::with_capacity(surviving.len() + 2);
        messages.push(PayloadMessage::new(Role::System, system_prompt));
        messages.extend(
            surviving
                .iter()
                .map(|t| PayloadMessage::new(t.role, t.content.clone())),
        );

        let mut current_included = false;
        if let Some(text) = current_text {
            if text.trim().is_empty() {
                debug!(session_id = %history.session_id, "current text empty, not appended");
            } else if let Some(rule) = pollution::detect(text, FilterTier::Light) {
                debug!(
                    session_id = %history.session_id,
                    rule = rule,
                    "current text looks like action output, not appended"
                );
            } else {
                messages.push(PayloadMessage::new(Role::User, text));
                current_included = true;
            }
        }

        let payload = ModelRequestPayload {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
            max_output_tokens: model_limits::cap_output_tokens(
                &self.config.model,
                self.config.max_output_tokens,
            ),
            stream: false,
        };

        BuildReport {
            payload,
            trimmed,
            screened,
            current_included,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::chat_history::HistoryBudget;
    use crate::payload::sanitizer;

    fn builder_with_limit(soft_token_limit: usize) -> PayloadBuilder {
        PayloadBuilder::new(BuilderConfig {
            soft_token_limit,
            ..Default::default()
        })
    }

    fn history_with_pairs(pairs: usize, chars_each: usize) -> ChatHistory {
        let mut history = ChatHistory::new(
            "s1",
            HistoryBudget {
                soft_token_limit: usize::MAX,
                max_turns: usize::MAX,
                chars_per_token: 4,
            },
        );
        for i in 0..pairs {
            let user = format!("question {i} {}", "q".repeat(chars_each));
            let assistant = format!("réponse {i} {}", "r".repeat(chars_each));
            assert!(history.add(Role::User, &user).was_added());
            assert!(history.add(Role::Assistant, &assistant).was_added());
        }
        history
    }

    #[test]
    fn test_system_first_current_last() {
        let builder = builder_with_limit(4000);
        let history = history_with_pairs(2, 40);
        let report = builder.build(&history, Some("et maintenant ?"));

        let messages = &report.payload.messages;
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.last().map(|m| m.role), Some(Role::User));
        assert_eq!(messages.last().map(|m| m.content.as_str()), Some("et maintenant ?"));
        assert!(report.current_included);
        assert_eq!(messages.len(), 6); // system + 4 turns + current
    }

    #[test]
    fn test_trims_oldest_first_to_budget() {
        let builder = builder_with_limit(600);
        // 8 turns of ~100 tokens each (400 chars), well over a 600 budget.
        let history = history_with_pairs(4, 390);
        let report = builder.build(&history, Some("dernier message"));

        assert!(report.trimmed > 0);
        let total_tokens: usize = report.payload.messages
            [..report.payload.messages.len() - 1]
            .iter()
            .map(|m| crate::utils::token_estimator::estimate_tokens(&m.content, 4))
            .sum();
        assert!(total_tokens <= 600);

        // Survivors are exactly the newest suffix of the stored turns.
        let contents: Vec<String> = report.payload.messages
            [1..report.payload.messages.len() - 1]
            .iter()
            .map(|m| m.content.clone())
            .collect();
        let expected: Vec<String> = history.turns()[report.trimmed..]
            .iter()
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn test_keeps_at_least_two_turns() {
        let builder = builder_with_limit(10);
        let history = history_with_pairs(3, 400);
        let report = builder.build(&history, None);
        // system + 2 floor turns
        assert_eq!(report.payload.messages.len(), 3);
        assert_eq!(report.trimmed, 4);
    }

    #[test]
    fn test_current_text_exempt_from_budget() {
        let builder = builder_with_limit(100);
        let history = history_with_pairs(1, 40);
        let giant = "x".repeat(8000); // 2000 tokens on its own
        let report = builder.build(&history, Some(&giant));
        assert!(report.current_included);
        assert_eq!(
            report.payload.messages.last().map(|m| m.content.len()),
            Some(8000)
        );
    }

    #[test]
    fn test_output_tokens_capped_per_model() {
        let builder = PayloadBuilder::new(BuilderConfig {
            max_output_tokens: 100_000,
            ..Default::default()
        });
        let history = history_with_pairs(1, 10);
        let report = builder.build(&history, Some("salut"));
        assert_eq!(report.payload.max_output_tokens, 32_768);
    }

    #[test]
    fn test_screens_polluted_stored_turn() {
        // A blob written by an older version can carry a polluted turn;
        // rebuild one through deserialization.
        let mut history = history_with_pairs(1, 10);
        let polluted = serde_json::json!({
            "id": uuid::Uuid::new_v4(),
            "session_id": "s1",
            "role": "assistant",
            "content": "J'ai trouvé 3 projet(s) : Alpha, Beta, Gamma",
            "created_at": chrono::Utc::now(),
            "token_estimate": 12,
        });
        let mut raw = serde_json::to_value(&history).unwrap();
        raw["turns"].as_array_mut().unwrap().push(polluted);
        history = serde_json::from_value(raw).unwrap();

        let builder = builder_with_limit(4000);
        let report = builder.build(&history, Some("au fait ?"));
        assert_eq!(report.screened, 1);
        assert!(report
            .payload
            .messages
            .iter()
            .all(|m| !m.content.contains("projet(s)")));
    }

    #[test]
    fn test_polluted_current_text_dropped() {
        let builder = builder_with_limit(4000);
        let history = history_with_pairs(1, 10);
        let report = builder.build(&history, Some("J'ai trouvé 3 projet(s) : Alpha"));
        assert!(!report.current_included);
        assert_eq!(report.payload.messages.last().map(|m| m.role), Some(Role::Assistant));
    }

    #[test]
    fn test_clarification_swaps_system_prompt() {
        let builder = builder_with_limit(4000);
        let history = history_with_pairs(1, 10);
        let report = builder.build_clarification(&history, Some("fais le truc"));
        assert!(report.payload.messages[0].content.contains("ambiguë"));
        assert!(report.current_included);
    }

    #[test]
    fn test_built_payload_passes_validation() {
        let builder = builder_with_limit(4000);
        let history = history_with_pairs(2, 40);
        let report = builder.build(&history, Some("encore une question"));
        let raw: Vec<serde_json::Value> = report
            .payload
            .messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect();
        assert!(sanitizer::validate(&raw));
    }

    #[test]
    fn test_empty_history_still_builds() {
        let builder = builder_with_limit(4000);
        let history = ChatHistory::new("s1", HistoryBudget::default());
        let report = builder.build(&history, Some("premier message"));
        assert_eq!(report.payload.messages.len(), 2);
        assert_eq!(report.trimmed, 0);
    }
}
