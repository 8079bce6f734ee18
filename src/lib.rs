pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Commands};

pub use adapters::{KnowledgeBase, OpenAiChatModel, OpenAiClient, OpenAiEmbedder, SqliteTicketStore};
pub use api::{build_router, AppState, TriageMetrics};
pub use config::AppConfig;
pub use core::runner::TriageAgent;
pub use utils::error::{Result, TriageError};
