// Adapters layer: concrete implementations for external systems (LLM API, vector index, database)

pub mod kb;
pub mod openai;
pub mod sqlite_store;

pub use kb::{IngestReport, KnowledgeBase};
pub use openai::{OpenAiChatModel, OpenAiClient, OpenAiEmbedder};
pub use sqlite_store::SqliteTicketStore;
