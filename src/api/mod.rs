pub mod metrics;
pub mod server;

pub use metrics::TriageMetrics;
pub use server::{build_router, serve, shutdown_signal, ApiError, AppState};
