use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("engine is at capacity")]
    Overloaded,
    #[error("job not found")]
    NotFound,
    #[error("workspace failure: {0}")]
    Workspace(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}
