//! Error types for handle operations.

use thiserror::Error;

/// Result type for handle operations.
pub type HandleResult<T> = Result<T, HandleError>;

/// Errors returned by [`MongoHandle`](crate::MongoHandle) operations.
#[derive(Error, Debug)]
pub enum HandleError {
    /// The handle owns no connection. Raised before any I/O.
    #[error("DB is not connected")]
    NotConnected,

    /// Caller input was rejected before reaching the server.
    #[error("query is not valid: {0}")]
    Validation(String),

    /// Dialing the server failed.
    #[error("connection error: {0}")]
    Connection(#[source] mongodb::error::Error),

    /// Error surfaced by the driver.
    #[error("mongodb error: {0}")]
    Driver(#[from] mongodb::error::Error),

    /// A value could not be converted to BSON.
    #[error("bson serialization error: {0}")]
    Serialize(#[from] bson::ser::Error),

    /// A document could not be decoded into the requested type.
    #[error("bson deserialization error: {0}")]
    Deserialize(#[from] bson::de::Error),

    /// A single-document write matched nothing.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Invalid handle configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HandleError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if the handle was not connected.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
