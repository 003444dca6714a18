//! Request-scoped failures.
//!
//! None of these are fatal to the process; each one maps onto a single HTTP
//! response built by the gateway.

use axum::http::StatusCode;

/// Largest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 200;
/// Largest accepted value, in bytes.
pub const MAX_VALUE_LEN: usize = 1024 * 1024;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KvsError {
    #[error("Unable to serve request and maintain causal consistency")]
    CausalNotSatisfied { key: String },

    #[error("Key does not exist")]
    KeyNotFound { key: String },

    #[error("Must have at least one shard")]
    InvalidShardCount,

    #[error("Not enough nodes for {requested} shards")]
    NotEnoughNodes { requested: usize },

    #[error("Not enough nodes. {requested} shards result in a nonfault tolerant shard")]
    NotFaultTolerant { requested: usize },

    #[error("No shard with id {0}")]
    UnknownShard(String),

    #[error("{0} is already in view")]
    AlreadyInView(String),

    #[error("{0} is not in current view")]
    NotInView(String),

    #[error("Key not valid")]
    KeyTooLong,

    #[error("Object too large. Size limit is 1MB")]
    ValueTooLarge,

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Unable to reach {0}")]
    PeerUnreachable(String),
}

impl KvsError {
    pub fn status(&self) -> StatusCode {
        match self {
            KvsError::CausalNotSatisfied { .. } => StatusCode::BAD_REQUEST,
            KvsError::KeyNotFound { .. } => StatusCode::NOT_FOUND,
            KvsError::InvalidShardCount
            | KvsError::NotEnoughNodes { .. }
            | KvsError::NotFaultTolerant { .. } => StatusCode::BAD_REQUEST,
            // Unknown shard ids are reported in-band.
            KvsError::UnknownShard(_) => StatusCode::OK,
            KvsError::AlreadyInView(_) | KvsError::NotInView(_) => StatusCode::NOT_FOUND,
            KvsError::KeyTooLong | KvsError::ValueTooLarge => StatusCode::UNPROCESSABLE_ENTITY,
            KvsError::MissingField(_) | KvsError::InvalidPayload(_) | KvsError::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            KvsError::PeerUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

pub fn validate_key(key: &str) -> Result<(), KvsError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(KvsError::KeyTooLong);
    }
    Ok(())
}

pub fn validate_value(value: &str) -> Result<(), KvsError> {
    if value.len() > MAX_VALUE_LEN {
        return Err(KvsError::ValueTooLarge);
    }
    Ok(())
}
