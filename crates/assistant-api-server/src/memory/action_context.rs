use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Hard ceiling on the serialized size of one action context.
pub const MAX_CONTEXT_BYTES: usize = 10 * 1024;
/// Hard ceiling on the id selection.
pub const MAX_SELECTED_IDS: usize = 64;
/// Hard ceiling on a single id or cursor value.
pub const MAX_ID_LEN: usize = 64;

/// Command category last executed for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    List,
    Create,
    Update,
    Delete,
    Complete,
    Select,
}

/// Whether a pending action targets every match or only the current
/// selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionScope {
    #[default]
    All,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStatus {
    Todo,
    InProgress,
    Done,
    Archived,
}

/// Active result filter. Deliberately closed: enum values, ids and dates
/// only, so no conversational text can hide in here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ActionFilter {
    pub status: Option<FilterStatus>,
    pub project_id: Option<String>,
    pub due_before: Option<NaiveDate>,
}

/// A destructive command awaiting user confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub action: ActionKind,
    pub target_ids: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

/// Confirmation request as produced by the command router, before a
/// deadline is stamped on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub action: ActionKind,
    pub target_ids: Vec<String>,
}

/// Patch emitted by the command router after handling one command.
/// Unset fields leave the context untouched; the `clear_*` flags reset a
/// field explicitly.
#[derive(Debug, Default, Clone)]
pub struct ContextUpdate {
    pub selected_ids: Option<Vec<String>>,
    pub filter: Option<ActionFilter>,
    pub clear_filter: bool,
    pub action: Option<ActionKind>,
    pub scope: Option<ActionScope>,
    pub confirmation: Option<ConfirmationRequest>,
    pub clear_confirmation: bool,
    pub cursor: Option<String>,
    pub clear_cursor: bool,
}

/// Action-side memory for one session.
///
/// Holds the structured state command handlers need between turns and
/// nothing else. There is intentionally no field able to carry free-form
/// text, so this record can never leak phrasing back into conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionContext {
    pub session_id: String,
    selected_ids: Vec<String>,
    active_filter: Option<ActionFilter>,
    last_action: Option<ActionKind>,
    scope: ActionScope,
    pending: Option<PendingConfirmation>,
    cursor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl ActionContext {
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            selected_ids: Vec::new(),
            active_filter: None,
            last_action: None,
            scope: ActionScope::default(),
            pending: None,
            cursor: None,
            created_at: now,
            last_activity: now,
        }
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn selected_ids(&self) -> &[String] {
        &self.selected_ids
    }

    /// Replace the id selection. Ids are trimmed, deduplicated in order and
    /// capped; anything over a bound is dropped, not propagated.
    pub fn set_selected_ids(&mut self, ids: Vec<String>) {
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::new();
        let mut dropped = 0usize;

        for id in ids {
            let id = id.trim().to_string();
            if id.is_empty() || id.len() > MAX_ID_LEN || !seen.insert(id.clone()) {
                dropped += 1;
                continue;
            }
            if kept.len() >= MAX_SELECTED_IDS {
                dropped += 1;
                continue;
            }
            kept.push(id);
        }

        if dropped > 0 {
            tracing::warn!(
                session_id = %self.session_id,
                dropped = dropped,
                "selection ids dropped at context bounds"
            );
        }
        self.selected_ids = kept;
        self.touch();
    }

    pub fn clear_selection(&mut self) {
        self.selected_ids.clear();
        self.touch();
    }

    pub fn active_filter(&self) -> Option<&ActionFilter> {
        self.active_filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: ActionFilter) {
        self.active_filter = Some(filter);
        self.touch();
    }

    pub fn clear_filter(&mut self) {
        self.active_filter = None;
        self.touch();
    }

    pub fn last_action(&self) -> Option<ActionKind> {
        self.last_action
    }

    pub fn record_action(&mut self, kind: ActionKind) {
        self.last_action = Some(kind);
        self.touch();
    }

    pub fn scope(&self) -> ActionScope {
        self.scope
    }

    pub fn set_scope(&mut self, scope: ActionScope) {
        self.scope = scope;
        self.touch();
    }

    /// Clearing the selection also drops a `Selected` scope, which would
    /// otherwise target nothing.
    pub fn effective_scope(&self) -> ActionScope {
        if self.scope == ActionScope::Selected && self.selected_ids.is_empty() {
            ActionScope::All
        } else {
            self.scope
        }
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn set_cursor(&mut self, cursor: Option<String>) {
        self.cursor = cursor
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty() && c.len() <= MAX_ID_LEN);
        self.touch();
    }

    /// Current pending confirmation, lazily discarding an expired one.
    pub fn pending_confirmation(&mut self) -> Option<&PendingConfirmation> {
        self.pending_confirmation_at(Utc::now())
    }

    /// Clock-injected variant of [`pending_confirmation`].
    ///
    /// [`pending_confirmation`]: ActionContext::pending_confirmation
    pub fn pending_confirmation_at(&mut self, now: DateTime<Utc>) -> Option<&PendingConfirmation> {
        if let Some(pending) = &self.pending {
            if pending.expires_at <= now {
                tracing::debug!(
                    session_id = %self.session_id,
                    "pending confirmation expired"
                );
                self.pending = None;
            }
        }
        self.pending.as_ref()
    }

    pub fn set_pending_confirmation(&mut self, request: ConfirmationRequest, ttl: Duration) {
        let mut target_ids: Vec<String> = request
            .target_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && id.len() <= MAX_ID_LEN)
            .collect();
        target_ids.truncate(MAX_SELECTED_IDS);

        self.pending = Some(PendingConfirmation {
            action: request.action,
            target_ids,
            expires_at: Utc::now() + ttl,
        });
        self.touch();
    }

    pub fn clear_pending_confirmation(&mut self) {
        self.pending = None;
        self.touch();
    }

    /// Apply a router patch in one step. `confirmation_ttl` stamps the
    /// deadline on a newly requested confirmation.
    pub fn apply(&mut self, update: ContextUpdate, confirmation_ttl: Duration) {
        if let Some(scope) = update.scope {
            self.set_scope(scope);
        }
        if let Some(ids) = update.selected_ids {
            self.set_selected_ids(ids);
        }
        if update.clear_filter {
            self.clear_filter();
        }
        if let Some(filter) = update.filter {
            self.set_filter(filter);
        }
        if let Some(kind) = update.action {
            self.record_action(kind);
        }
        if update.clear_confirmation {
            self.clear_pending_confirmation();
        }
        if let Some(request) = update.confirmation {
            self.set_pending_confirmation(request, confirmation_ttl);
        }
        if update.clear_cursor {
            self.cursor = None;
        }
        if let Some(cursor) = update.cursor {
            self.set_cursor(Some(cursor));
        }
        self.touch();
    }

    /// Reset to a fresh context, keeping identity and creation time.
    pub fn reset(&mut self) {
        self.selected_ids.clear();
        self.active_filter = None;
        self.last_action = None;
        self.scope = ActionScope::default();
        self.pending = None;
        self.cursor = None;
        self.touch();
    }

    /// Serialized footprint in bytes.
    pub fn encoded_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }

    /// Consistency scan against the context bounds.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.selected_ids.len() > MAX_SELECTED_IDS {
            issues.push(format!(
                "selection holds {} ids, cap is {}",
                self.selected_ids.len(),
                MAX_SELECTED_IDS
            ));
        }
        if self.selected_ids.iter().any(|id| id.trim().is_empty()) {
            issues.push("selection holds an empty id".to_string());
        }
        let size = self.encoded_size();
        if size > MAX_CONTEXT_BYTES {
            issues.push(format!(
                "context serializes to {} bytes, cap is {}",
                size, MAX_CONTEXT_BYTES
            ));
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_dedups_and_caps() {
        let mut ctx = ActionContext::new("s1");
        let mut ids: Vec<String> = (0..100).map(|i| format!("id-{i}")).collect();
        ids.push("id-0".to_string()); // duplicate
        ids.push("  ".to_string()); // empty after trim
        ctx.set_selected_ids(ids);
        assert_eq!(ctx.selected_ids().len(), MAX_SELECTED_IDS);
        assert_eq!(ctx.selected_ids()[0], "id-0");
    }

    #[test]
    fn test_oversized_id_dropped() {
        let mut ctx = ActionContext::new("s1");
        ctx.set_selected_ids(vec!["ok".to_string(), "x".repeat(MAX_ID_LEN + 1)]);
        assert_eq!(ctx.selected_ids(), &["ok".to_string()]);
    }

    #[test]
    fn test_selected_scope_needs_a_selection() {
        let mut ctx = ActionContext::new("s1");
        ctx.set_scope(ActionScope::Selected);
        // Nothing selected yet: a "selected" action would target nothing.
        assert_eq!(ctx.effective_scope(), ActionScope::All);

        ctx.set_selected_ids(vec!["p-1".to_string()]);
        assert_eq!(ctx.effective_scope(), ActionScope::Selected);

        ctx.clear_selection();
        assert_eq!(ctx.effective_scope(), ActionScope::All);
    }

    #[test]
    fn test_pending_confirmation_expires_lazily() {
        let mut ctx = ActionContext::new("s1");
        ctx.set_pending_confirmation(
            ConfirmationRequest {
                action: ActionKind::Delete,
                target_ids: vec!["p-1".to_string()],
            },
            Duration::seconds(60),
        );
        assert!(ctx.pending_confirmation().is_some());

        let later = Utc::now() + Duration::seconds(120);
        assert!(ctx.pending_confirmation_at(later).is_none());
        // Expired entry is gone for good, even for an earlier clock.
        assert!(ctx.pending_confirmation_at(Utc::now()).is_none());
    }

    #[test]
    fn test_apply_router_patch() {
        let mut ctx = ActionContext::new("s1");
        ctx.apply(
            ContextUpdate {
                selected_ids: Some(vec!["p-9".to_string()]),
                filter: Some(ActionFilter {
                    status: Some(FilterStatus::InProgress),
                    ..Default::default()
                }),
                action: Some(ActionKind::List),
                ..Default::default()
            },
            Duration::seconds(60),
        );
        assert_eq!(ctx.selected_ids(), &["p-9".to_string()]);
        assert_eq!(ctx.last_action(), Some(ActionKind::List));
        assert_eq!(
            ctx.active_filter().and_then(|f| f.status),
            Some(FilterStatus::InProgress)
        );
    }

    #[test]
    fn test_bounded_even_when_full() {
        let mut ctx = ActionContext::new("session-with-a-long-identifier");
        ctx.set_selected_ids((0..MAX_SELECTED_IDS).map(|i| format!("id-{i:058}")).collect());
        ctx.set_filter(ActionFilter {
            status: Some(FilterStatus::Archived),
            project_id: Some("p".repeat(MAX_ID_LEN)),
            due_before: Some(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()),
        });
        ctx.set_pending_confirmation(
            ConfirmationRequest {
                action: ActionKind::Delete,
                target_ids: (0..MAX_SELECTED_IDS).map(|i| format!("t-{i:057}")).collect(),
            },
            Duration::seconds(60),
        );
        ctx.set_cursor(Some("c".repeat(MAX_ID_LEN)));

        assert!(ctx.validate().is_empty());
        assert!(ctx.encoded_size() <= MAX_CONTEXT_BYTES);
    }

    #[test]
    fn test_reset_keeps_identity() {
        let mut ctx = ActionContext::new("s1");
        ctx.set_selected_ids(vec!["p-1".to_string()]);
        ctx.record_action(ActionKind::Update);
        let created = ctx.created_at;
        ctx.reset();
        assert!(ctx.selected_ids().is_empty());
        assert!(ctx.last_action().is_none());
        assert_eq!(ctx.session_id, "s1");
        assert_eq!(ctx.created_at, created);
    }
}
