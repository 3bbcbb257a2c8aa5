/**
 * Backend Error Types
 * 
 * Three families of errors live here:
 * 
 * - `CacheError` - raised by `ChatStore` implementations. It never escapes
 *   `CacheClient`; the client logs it and serves the call from the fallback.
 * - `ReplicationError` - raised by `MirrorStore` and `PrimarySource`
 *   implementations. `ReplicationSync` turns it into a logged outcome value.
 * - `BackendError` - returned by the operational HTTP routes and converted
 *   into a JSON response (see `conversion`).
 */

use thiserror::Error;

use crate::shared::SharedError;

#[cfg(feature = "ssr")]
use axum::http::StatusCode;

/// Errors from a chat cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    /// The fast-path store returned an error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A cached value could not be encoded or decoded
    #[error(transparent)]
    Shared(#[from] SharedError),

    /// The backend has been closed or never connected
    #[error("{backend} backend unavailable")]
    Unavailable {
        /// Backend name
        backend: &'static str,
    },
}

impl CacheError {
    /// Whether this error means the connection itself is gone.
    ///
    /// Connection-level failures flip the backend selector to the fallback;
    /// anything else only affects the current call.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Redis(err) => {
                err.is_io_error()
                    || err.is_connection_refusal()
                    || err.is_connection_dropped()
                    || err.is_timeout()
            }
            Self::Unavailable { .. } => true,
            Self::Shared(_) => false,
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Shared(err.into())
    }
}

/// Errors from the backup mirror or the primary store
#[derive(Debug, Error)]
pub enum ReplicationError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("Primary store error: {0}")]
    Primary(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A primary record could not be mirrored
    #[error("Invalid record in '{collection}': {reason}")]
    InvalidRecord {
        /// Collection the record came from
        collection: String,
        /// Why the record was rejected
        reason: String,
    },

    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Backup mirror not configured")]
    NotConfigured,
}

impl ReplicationError {
    pub fn invalid_record(collection: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            collection: collection.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the store itself could not be reached, as opposed to it
    /// rejecting the data that was sent.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Primary(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Mongo(err) => matches!(*err.kind, mongodb::error::ErrorKind::Io(_)),
            Self::Io(_) | Self::NotConfigured => true,
            Self::Bson(_)
            | Self::Serialization(_)
            | Self::InvalidRecord { .. }
            | Self::InvalidCollection(_) => false,
        }
    }
}

/// Errors returned by the operational HTTP routes
#[cfg(feature = "ssr")]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Request could not be handled (bad input, etc.)
    #[error("Handler error: {message}")]
    HandlerError {
        /// HTTP status code for this error
        status: StatusCode,
        /// Human-readable error message
        message: String,
    },

    /// A store the operation needs is not configured
    #[error("{service} is not configured")]
    NotConfigured {
        /// Service name
        service: &'static str,
    },

    /// The operation ran and reported failure
    #[error("{operation} failed")]
    OperationFailed {
        /// Operation name
        operation: &'static str,
    },

    /// The operation is deliberately unsupported
    #[error("{message}")]
    NotImplemented {
        /// Explanation
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[cfg(feature = "ssr")]
impl BackendError {
    /// Create a new handler error with a status code
    pub fn handler(status: StatusCode, message: impl Into<String>) -> Self {
        Self::HandlerError {
            status,
            message: message.into(),
        }
    }

    pub fn not_configured(service: &'static str) -> Self {
        Self::NotConfigured { service }
    }

    pub fn failed(operation: &'static str) -> Self {
        Self::OperationFailed { operation }
    }

    /// Get the HTTP status code for this error
    ///
    /// - `HandlerError` - the status carried by the error
    /// - `NotConfigured` - 503 Service Unavailable
    /// - `OperationFailed` - 500 Internal Server Error
    /// - `NotImplemented` - 501 Not Implemented
    /// - `SerializationError` - 500 Internal Server Error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::HandlerError { status, .. } => *status,
            Self::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::OperationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::HandlerError { message, .. } => message.clone(),
            Self::NotImplemented { message } => message.clone(),
            other => other.to_string(),
        }
    }
}
