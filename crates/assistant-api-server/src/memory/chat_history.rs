use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::pollution;
use crate::models::chat::{ChatTurn, Role};
use crate::payload::sanitizer;

/// Budget knobs applied to one session's chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryBudget {
    /// Soft ceiling on the summed token estimates of stored turns.
    pub soft_token_limit: usize,
    /// Hard ceiling on the number of stored turns.
    pub max_turns: usize,
    /// Divisor for the grapheme-based token estimate.
    pub chars_per_token: usize,
}

impl Default for HistoryBudget {
    fn default() -> Self {
        Self {
            soft_token_limit: 4000,
            max_turns: 40,
            chars_per_token: 4,
        }
    }
}

/// Result of one insertion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// Turn stored; `evicted` oldest turns were dropped to make room.
    Added { evicted: usize },
    /// Turn refused, nothing changed.
    Rejected { reason: &'static str },
}

impl AddOutcome {
    pub fn was_added(&self) -> bool {
        matches!(self, AddOutcome::Added { .. })
    }
}

/// Report for a bulk import of raw turn values.
#[derive(Debug, Default, Clone)]
pub struct ImportReport {
    pub accepted: usize,
    pub dropped: usize,
}

/// Conversational memory for one session.
///
/// Append-only from the caller's point of view: turns enter through [`add`]
/// and only leave through oldest-first eviction or [`clear`]. Everything
/// stored here is eligible to be replayed to the model, which is why inserts
/// are screened against action-output shapes.
///
/// [`add`]: ChatHistory::add
/// [`clear`]: ChatHistory::clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub session_id: String,
    turns: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Attached by the registry on load, never persisted.
    #[serde(skip)]
    budget: HistoryBudget,
}

impl ChatHistory {
    pub fn new(session_id: &str, budget: HistoryBudget) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            turns: Vec::new(),
            created_at: now,
            last_activity: now,
            budget,
        }
    }

    /// Re-attach the configured budget after deserialization.
    pub fn attach_budget(&mut self, budget: HistoryBudget) {
        self.budget = budget;
    }

    pub fn budget(&self) -> &HistoryBudget {
        &self.budget
    }

    /// Try to append a turn. Empty content is ignored, action-output shapes
    /// are rejected, and a successful insert evicts oldest turns until the
    /// history fits its budget again.
    pub fn add(&mut self, role: Role, content: &str) -> AddOutcome {
        if content.trim().is_empty() {
            return AddOutcome::Rejected { reason: "empty" };
        }

        if let Some(rule) = pollution::detect(content, pollution::tier_for_role(role)) {
            tracing::debug!(
                session_id = %self.session_id,
                role = %role,
                rule = rule,
                "chat memory rejected action-output shaped content"
            );
            return AddOutcome::Rejected { reason: rule };
        }

        let turn = ChatTurn::new(&self.session_id, role, content, self.budget.chars_per_token);
        self.turns.push(turn);
        self.last_activity = Utc::now();

        let evicted = self.evict_over_budget();
        AddOutcome::Added { evicted }
    }

    /// Drop oldest turns until both the token budget and the turn-count cap
    /// hold. The most recent turn is never evicted.
    fn evict_over_budget(&mut self) -> usize {
        let mut evicted = 0;
        while self.turns.len() > 1
            && (self.total_tokens() > self.budget.soft_token_limit
                || self.turns.len() > self.budget.max_turns)
        {
            let dropped = self.turns.remove(0);
            evicted += 1;
            tracing::debug!(
                session_id = %self.session_id,
                turn_id = %dropped.id,
                tokens = dropped.token_estimate,
                "evicted oldest turn over budget"
            );
        }
        evicted
    }

    /// Summed token estimates of all stored turns.
    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.token_estimate).sum()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// The newest `n` turns, oldest of those first.
    pub fn last(&self, n: usize) -> &[ChatTurn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.last_activity = Utc::now();
    }

    /// Serialize the stored turns for handoff or inspection.
    pub fn export(&self) -> Vec<serde_json::Value> {
        self.turns
            .iter()
            .filter_map(|t| serde_json::to_value(t).ok())
            .collect()
    }

    /// Re-insert raw turn values. Entries are coerced through the lenient
    /// sanitizer first, then each survivor goes back through [`add`], so
    /// screening and budget eviction apply. Imported turns always take THIS
    /// store's session id.
    ///
    /// [`add`]: ChatHistory::add
    pub fn import(&mut self, raw: &[serde_json::Value]) -> ImportReport {
        let mut report = ImportReport::default();
        let sanitized = sanitizer::sanitize(raw, false);
        report.dropped += sanitized.dropped;
        for message in sanitized.messages {
            if self.add(message.role, &message.content).was_added() {
                report.accepted += 1;
            } else {
                report.dropped += 1;
            }
        }
        report
    }

    /// Consistency scan. Returns one message per problem found; empty means
    /// the history is clean.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (idx, turn) in self.turns.iter().enumerate() {
            if turn.content.trim().is_empty() {
                issues.push(format!("turn {} has empty content", idx));
            }
            if turn.session_id != self.session_id {
                issues.push(format!(
                    "turn {} belongs to session {} instead of {}",
                    idx, turn.session_id, self.session_id
                ));
            }
            if let Some(rule) =
                pollution::detect(&turn.content, pollution::tier_for_role(turn.role))
            {
                issues.push(format!("turn {} matches action-output rule {}", idx, rule));
            }
        }
        issues
    }
}
