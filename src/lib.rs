pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod metrics;
pub mod models;
pub mod profile;
pub mod queue;
pub mod sandbox;
pub mod worker;
pub mod workspace;

pub use config::{EngineConfig, IsolationMode};
pub use engine::Engine;
pub use error::EngineError;
pub use models::{
    ExecutionLimits, ExecutionRequest, ExecutionResult, ExecutionStatus, JobSnapshot, JobState,
    LimitsOverride,
};

pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .with_span_list(false)
        .init();
}
