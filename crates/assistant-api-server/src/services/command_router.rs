use tracing::debug;

use crate::memory::ActionContext;
use crate::utils::error::ApiError;

use super::conversation::{CommandRouter, RouterOutcome};

/// Stand-in router used until the host application wires its own.
///
/// Acknowledges the command and leaves the action context untouched. The
/// real project/task executor lives in the host application and is plugged
/// in through the `CommandRouter` trait.
pub struct PassthroughRouter;

#[async_trait::async_trait]
impl CommandRouter for PassthroughRouter {
    async fn route(
        &self,
        session_id: &str,
        text: &str,
        _context: &ActionContext,
    ) -> Result<RouterOutcome, ApiError> {
        debug!(
            session_id,
            text_len = text.len(),
            "passthrough router acknowledged command"
        );

        Ok(RouterOutcome {
            reply: "La gestion des projets et des tâches n'est pas encore connectée à \
                    l'assistant. Je peux répondre à vos questions en attendant."
                .to_string(),
            context_update: None,
        })
    }
}
