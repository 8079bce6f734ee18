pub mod chunker;
pub mod classify;
pub mod decision;
pub mod draft;
pub mod eval;
pub mod llm_output;
pub mod pii;
pub mod retry;
pub mod runner;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::domain::model::{DecisionResult, DraftReply, TicketClassification, TriageOutput};
pub use crate::domain::ports::{ChatModel, Embedder, Retriever, TicketStore};
pub use crate::utils::error::Result;
