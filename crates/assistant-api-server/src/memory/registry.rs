use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use sysinfo::System;
use tracing::{debug, info, warn};

use super::action_context::ActionContext;
use super::backend::{KvBackend, StoreError};
use super::chat_history::{ChatHistory, HistoryBudget};

/// Registry knobs. Chat and action stores share one backend but carry
/// their own key namespace and TTL.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub namespace: String,
    pub chat_ttl: Duration,
    pub action_ttl: Duration,
    pub budget: HistoryBudget,
    /// New sessions are refused above this RAM usage.
    pub max_memory_percent: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "assistant".to_string(),
            chat_ttl: Duration::from_secs(6 * 60 * 60),
            action_ttl: Duration::from_secs(60 * 60),
            budget: HistoryBudget::default(),
            max_memory_percent: 90.0,
        }
    }
}

/// Registry statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub backend: &'static str,
    pub chat_sessions: usize,
    pub action_sessions: usize,
    pub memory_usage_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f64,
}

/// Session store registry.
///
/// Hands out per-session [`ChatHistory`] and [`ActionContext`] records by
/// loading them from the backend, and persists them back with a fresh TTL.
/// First access for a session creates an empty record, gated on available
/// RAM so a flood of new sessions cannot starve the process.
pub struct StoreRegistry {
    backend: Arc<dyn KvBackend>,
    config: RegistryConfig,
    system: parking_lot::Mutex<System>,
}

impl StoreRegistry {
    pub fn new(backend: Arc<dyn KvBackend>, config: RegistryConfig) -> Self {
        info!(
            backend = backend.kind(),
            namespace = %config.namespace,
            "initializing session store registry"
        );
        Self {
            backend,
            config,
            system: parking_lot::Mutex::new(System::new_all()),
        }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    fn chat_key(&self, session_id: &str) -> String {
        format!("{}:chat:{}", self.config.namespace, session_id)
    }

    fn action_key(&self, session_id: &str) -> String {
        format!("{}:action:{}", self.config.namespace, session_id)
    }

    /// Load the chat history for a session, creating an empty one on first
    /// access. A blob that no longer deserializes is discarded instead of
    /// wedging the session.
    pub async fn chat(&self, session_id: &str) -> Result<ChatHistory, StoreError> {
        let key = self.chat_key(session_id);
        if let Some(raw) = self.backend.get(&key).await? {
            match serde_json::from_slice::<ChatHistory>(&raw) {
                Ok(mut history) => {
                    history.attach_budget(self.config.budget.clone());
                    debug!(session_id = session_id, turns = history.len(), "loaded chat history");
                    return Ok(history);
                }
                Err(e) => {
                    warn!(
                        session_id = session_id,
                        error = %e,
                        "discarding undecodable chat history blob"
                    );
                    self.backend.remove(&key).await?;
                }
            }
        }

        self.ensure_capacity(session_id)?;
        info!(session_id = session_id, "creating chat history");
        Ok(ChatHistory::new(session_id, self.config.budget.clone()))
    }

    /// Persist a chat history, refreshing its TTL.
    pub async fn put_chat(&self, history: &ChatHistory) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(history)?;
        self.backend
            .set(&self.chat_key(&history.session_id), Bytes::from(raw), self.config.chat_ttl)
            .await
    }

    /// Load the action context for a session, creating an empty one on
    /// first access.
    pub async fn action(&self, session_id: &str) -> Result<ActionContext, StoreError> {
        let key = self.action_key(session_id);
        if let Some(raw) = self.backend.get(&key).await? {
            match serde_json::from_slice::<ActionContext>(&raw) {
                Ok(context) => {
                    debug!(session_id = session_id, "loaded action context");
                    return Ok(context);
                }
                Err(e) => {
                    warn!(
                        session_id = session_id,
                        error = %e,
                        "discarding undecodable action context blob"
                    );
                    self.backend.remove(&key).await?;
                }
            }
        }

        self.ensure_capacity(session_id)?;
        info!(session_id = session_id, "creating action context");
        Ok(ActionContext::new(session_id))
    }

    /// Persist an action context, refreshing its TTL.
    pub async fn put_action(&self, context: &ActionContext) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(context)?;
        self.backend
            .set(
                &self.action_key(&context.session_id),
                Bytes::from(raw),
                self.config.action_ttl,
            )
            .await
    }

    /// Drop both records for one session.
    pub async fn remove_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.backend.remove(&self.chat_key(session_id)).await?;
        self.backend.remove(&self.action_key(session_id)).await?;
        Ok(())
    }

    /// Wipe every session of both kinds. Returns how many records went away.
    pub async fn reset_all(&self) -> Result<usize, StoreError> {
        let chats = self
            .backend
            .clear_prefix(&format!("{}:chat:", self.config.namespace))
            .await?;
        let actions = self
            .backend
            .clear_prefix(&format!("{}:action:", self.config.namespace))
            .await?;
        info!(chats = chats, actions = actions, "reset all session stores");
        Ok(chats + actions)
    }

    pub async fn stats(&self) -> Result<RegistryStats, StoreError> {
        let chat_sessions = self
            .backend
            .count_prefix(&format!("{}:chat:", self.config.namespace))
            .await?;
        let action_sessions = self
            .backend
            .count_prefix(&format!("{}:action:", self.config.namespace))
            .await?;

        let mut sys = self.system.lock();
        sys.refresh_memory();

        Ok(RegistryStats {
            backend: self.backend.kind(),
            chat_sessions,
            action_sessions,
            memory_usage_mb: sys.used_memory() / 1024 / 1024,
            memory_total_mb: sys.total_memory() / 1024 / 1024,
            memory_usage_percent: (sys.used_memory() as f64 / sys.total_memory() as f64) * 100.0,
        })
    }

    /// Check RAM headroom before admitting a brand-new session.
    fn ensure_capacity(&self, session_id: &str) -> Result<(), StoreError> {
        let mut sys = self.system.lock();
        sys.refresh_memory();

        let total_memory = sys.total_memory();
        let used_memory = sys.used_memory();
        let usage_percent = (used_memory as f64 / total_memory as f64) * 100.0;

        if usage_percent >= self.config.max_memory_percent {
            warn!(
                "Memory usage at {:.2}% (used: {} MB, total: {} MB), rejecting new session {}",
                usage_percent,
                used_memory / 1024 / 1024,
                total_memory / 1024 / 1024,
                session_id
            );
            return Err(StoreError::Capacity(format!(
                "memory usage at {usage_percent:.2}%, refusing new session"
            )));
        }
        Ok(())
    }
}
