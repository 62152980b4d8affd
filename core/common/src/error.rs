//! Common error types for Strongroom.
//!
//! Every failure carries a stable [`ErrorKind`] and an HTTP-mappable status
//! so the routing layer can translate it without inspecting messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Strongroom operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No authenticated principal was supplied.
    #[error("Unauthenticated")]
    Unauthenticated,

    /// A required parameter is missing or malformed.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Resource does not exist or the caller may not see it.
    ///
    /// Both cases are merged so callers cannot probe for existence.
    #[error("Not found or unauthorized")]
    NotFoundOrUnauthorized,

    /// The vault gate is closed.
    #[error("Vault is locked")]
    Locked,

    /// Wrong password or corrupted ciphertext.
    #[error("Decryption failed")]
    Decryption,

    /// A PIN or personal password did not match its stored hash.
    #[error("Invalid credential")]
    InvalidCredential,

    /// The persistence layer failed.
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// Cryptographic operation failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal failure.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    ValidationError,
    NotFoundOrUnauthorized,
    Locked,
    DecryptionError,
    InvalidCredential,
    RepositoryUnavailable,
    Internal,
}

impl Error {
    /// Stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthenticated => ErrorKind::Unauthenticated,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::NotFoundOrUnauthorized => ErrorKind::NotFoundOrUnauthorized,
            Error::Locked => ErrorKind::Locked,
            Error::Decryption => ErrorKind::DecryptionError,
            Error::InvalidCredential => ErrorKind::InvalidCredential,
            Error::RepositoryUnavailable(_) => ErrorKind::RepositoryUnavailable,
            Error::Crypto(_) | Error::Serialization(_) | Error::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status the routing layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Unauthenticated => 401,
            ErrorKind::ValidationError => 400,
            ErrorKind::NotFoundOrUnauthorized => 404,
            ErrorKind::Locked => 423,
            ErrorKind::DecryptionError => 400,
            ErrorKind::InvalidCredential => 403,
            ErrorKind::RepositoryUnavailable | ErrorKind::Internal => 500,
        }
    }

    /// Client-facing message. Never contains internal detail or key material.
    pub fn public_message(&self) -> String {
        match self {
            Error::Unauthenticated => "Authentication required".to_string(),
            Error::Validation(msg) => msg.clone(),
            Error::NotFoundOrUnauthorized => "Not found".to_string(),
            Error::Locked => {
                "Vault is locked. Members must submit their PINs to unlock it".to_string()
            }
            Error::Decryption => "Invalid password or corrupted file".to_string(),
            Error::InvalidCredential => "Invalid credential".to_string(),
            Error::RepositoryUnavailable(_)
            | Error::Crypto(_)
            | Error::Serialization(_)
            | Error::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Structured response body for this error.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.public_message(),
            kind: self.kind(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// JSON error body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
