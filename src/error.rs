use thiserror::Error;

/// Convenience alias for `Result<T, RetryError>`.
pub type RetryResult<T> = Result<T, RetryError>;

/// Closed set of domain errors. Every failure the engine or store can
/// surface is one of these kinds, so callers branch on the variant instead
/// of parsing messages. Processor declines are not errors; they travel
/// through the commit path as recorded attempts.
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("transaction {0} already submitted")]
    AlreadyExists(String),

    #[error("transaction {id} is not retryable: {reason}")]
    NotRetryable { id: String, reason: String },

    #[error("transaction {0}: all retry attempts exhausted")]
    Exhausted(String),

    #[error("invalid retry config: {0}")]
    ConfigInvalid(String),
}
