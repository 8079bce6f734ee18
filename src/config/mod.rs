#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

pub use toml_config::{
    AppConfig, DatabaseConfig, EmbeddingConfig, KbConfig, LlmConfig, LogFormat, PolicyConfig,
    RetryConfig, ServerConfig,
};
