use crate::domain::model::{AgentRun, KbHit, NewAgentRun, Review, ReviewStatus, Ticket, TicketInput};
use crate::utils::error::Result;
use async_trait::async_trait;

/// 聊天模型：輸入 prompt，回傳模型文字
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<KbHit>>;
}

pub trait TicketStore: Send + Sync {
    fn create_ticket(&self, ticket: &TicketInput) -> Result<Ticket>;
    fn create_agent_run(&self, run: &NewAgentRun) -> Result<AgentRun>;
    fn create_review(
        &self,
        agent_run_id: i64,
        status: ReviewStatus,
        reviewer_notes: Option<&str>,
        final_reply: Option<&str>,
    ) -> Result<Review>;
    fn get_ticket(&self, ticket_id: i64) -> Result<Option<Ticket>>;
    fn get_latest_agent_run(&self, ticket_id: i64) -> Result<Option<AgentRun>>;
    fn list_pending_reviews(&self, limit: usize) -> Result<Vec<Review>>;
    fn get_review(&self, review_id: i64) -> Result<Option<Review>>;
    fn approve_review(&self, review_id: i64, final_reply: &str) -> Result<Option<Review>>;
    fn reject_review(&self, review_id: i64, reviewer_notes: &str) -> Result<Option<Review>>;
}
