pub mod action_context;
pub mod backend;
pub mod chat_history;
pub mod pollution;
pub mod registry;

pub use action_context::ActionContext;
pub use chat_history::{ChatHistory, HistoryBudget};
pub use registry::StoreRegistry;
