pub mod command_router;
pub mod conversation;
pub mod model_client;

pub use command_router::PassthroughRouter;
pub use conversation::{CommandRouter, ConversationService, ModelClient, RouterOutcome, TurnReply};
pub use model_client::GroqClient;
