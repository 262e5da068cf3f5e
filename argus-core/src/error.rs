use thiserror::Error;

pub type ArgusResult<T> = Result<T, ArgusError>;

/// Error taxonomy for the pipeline. No stage lets an error of one family
/// leak into another: ingest surfaces only `SchemaInvalid`, `DuplicateId`
/// and `IngestRateLimited`; everything else is recovered locally and
/// recorded in the audit log.
#[derive(Error, Debug)]
pub enum ArgusError {
    #[error("event rejected: {0}")]
    SchemaInvalid(String),

    #[error("event id '{0}' already appended")]
    DuplicateId(String),

    #[error("ingest rate limit exceeded")]
    IngestRateLimited,

    #[error("storage transient failure: {0}")]
    StorageTransient(String),

    #[error("storage rejected record: {0}")]
    StoragePermanent(String),

    #[error("detector '{detector}' failed: {reason}")]
    DetectorFailure { detector: String, reason: String },

    #[error("rule '{rule}' evaluation failed: {reason}")]
    RuleEvaluationFailure { rule: String, reason: String },

    #[error("channel transient failure: {0}")]
    ChannelTransient(String),

    #[error("channel permanent failure: {0}")]
    ChannelPermanent(String),

    #[error("dispatch queue for channel '{channel}' saturated")]
    QueueOverflow { channel: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ArgusError {
    /// Whether a retry of the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ArgusError::StorageTransient(_) | ArgusError::ChannelTransient(_)
        )
    }
}
