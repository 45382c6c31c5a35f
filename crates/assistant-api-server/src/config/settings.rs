use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub budget: BudgetConfig,
    pub memory: MemoryConfig,
    pub rate_limit: RateLimitSettings,
    pub debug: DebugConfig,
    pub prompts: PromptsConfig,
    pub activity_log: ActivityLogSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    /// Usually supplied via APP__MODEL__API_KEY rather than the file
    pub api_key: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BudgetConfig {
    pub soft_token_limit: usize,
    pub max_turns: usize,
    pub chars_per_token: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemoryConfig {
    /// "memory" or "redis"
    pub backend: String,
    pub redis_url: Option<String>,
    pub chat_ttl_seconds: u64,
    pub action_ttl_seconds: u64,
    pub confirmation_ttl_seconds: i64,
    pub max_memory_percent: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_seconds: u64,
    pub per_user: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DebugConfig {
    pub strict_invariants: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptsConfig {
    pub system_prompt: String,
    pub clarification_prompt: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ActivityLogSettings {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub file_path: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        Ok(settings)
    }
}
