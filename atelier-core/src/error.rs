use thiserror::Error;

/// The abstract error taxonomy from the error-handling design: each variant
/// maps to one disposition (counted failure + sentinel, NACK-requeue, or
/// crash) rather than to a particular library's exception type.
#[derive(Error, Debug)]
pub enum AtelierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("source exceeds configured size limit: {0}")]
    OversizeSource(String),

    #[error("failed to decode image: {0}")]
    DecodeFailure(String),

    #[error("failed to encode image: {0}")]
    EncodeFailure(String),

    #[error("transient IO failure, safe to retry: {0}")]
    TransientIo(String),

    #[error("atomic update targeted a field that was never initialized: {0}")]
    SchemaAbsent(String),

    #[error("unrecognized message type: {0}")]
    UnknownMessageType(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AtelierError>;

/// The error-kind buckets tracked per job by `TrackError`.
/// A distinct, closed set rather than the raw [`AtelierError`] variant name
/// because several variants should roll up into one bucket for monitoring.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    OversizeSource,
    DecodeFailure,
    EncodeFailure,
    TransientIo,
    SchemaAbsent,
    UnknownMessageType,
    Other,
}

impl From<&AtelierError> for ErrorKind {
    fn from(err: &AtelierError) -> Self {
        match err {
            AtelierError::OversizeSource(_) => ErrorKind::OversizeSource,
            AtelierError::DecodeFailure(_) => ErrorKind::DecodeFailure,
            AtelierError::EncodeFailure(_) => ErrorKind::EncodeFailure,
            AtelierError::TransientIo(_) | AtelierError::Io(_) => ErrorKind::TransientIo,
            AtelierError::SchemaAbsent(_) => ErrorKind::SchemaAbsent,
            AtelierError::UnknownMessageType(_) => ErrorKind::UnknownMessageType,
            _ => ErrorKind::Other,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::OversizeSource => "oversize_source",
            ErrorKind::DecodeFailure => "decode_failure",
            ErrorKind::EncodeFailure => "encode_failure",
            ErrorKind::TransientIo => "transient_io",
            ErrorKind::SchemaAbsent => "schema_absent",
            ErrorKind::UnknownMessageType => "unknown_message_type",
            ErrorKind::Other => "other",
        };
        write!(f, "{s}")
    }
}
