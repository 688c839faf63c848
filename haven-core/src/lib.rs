pub mod dates;
pub mod repository;
pub mod search;

pub use dates::StayDates;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl CoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::StorageUnavailable(_) | CoreError::UpstreamUnavailable(_)
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
