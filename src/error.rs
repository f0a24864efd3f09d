use thiserror::Error;

/// Caller input rejected before any extraction happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("URL is required")]
    EmptyUrl,

    #[error("Sender address is required")]
    MissingSender,

    #[error("Email subject or body is required")]
    EmptyMessage,

    #[error("List of URLs is required")]
    EmptyBatch,

    #[error("Batch size limit exceeded (max {max}, got {got})")]
    BatchTooLarge { max: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
