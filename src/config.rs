use config::{Config, ConfigError, Environment, File};
use picker_services::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub reasoning: ReasoningConfig,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub provider_timeout_secs: u64,
    pub reasoning_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub max_concurrent_reasoning: usize,
    pub recent_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Root of the `<kind>/<TEAM>.json` factor snapshots.
    pub data_dir: String,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            // Start with default values
            .set_default("database.url", "sqlite://picker.db")?
            .set_default("database.max_connections", 5)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("analysis.provider_timeout_secs", 10)?
            .set_default("analysis.reasoning_timeout_secs", 120)?
            .set_default("analysis.max_attempts", 2)?
            .set_default("analysis.retry_base_delay_ms", 2000)?
            .set_default("analysis.max_concurrent_reasoning", 4)?
            .set_default("analysis.recent_limit", 10)?
            .set_default("reasoning.endpoint", "https://api.openai.com/v1/chat/completions")?
            .set_default("reasoning.model", "gpt-4o-mini")?
            .set_default("providers.data_dir", "data/factors")?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // PICKER_SERVER__PORT=8080 style overrides
            .add_source(
                Environment::with_prefix("PICKER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("reasoning.api_key", env::var("OPENAI_API_KEY").ok())?
            .build()?;

        config.try_deserialize()
    }

    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            provider_timeout: Duration::from_secs(self.analysis.provider_timeout_secs),
            reasoning_timeout: Duration::from_secs(self.analysis.reasoning_timeout_secs),
            max_attempts: self.analysis.max_attempts,
            retry_base_delay: Duration::from_millis(self.analysis.retry_base_delay_ms),
            max_concurrent_reasoning: self.analysis.max_concurrent_reasoning,
        }
    }
}
