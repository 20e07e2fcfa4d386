use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::storage::KeyValueStore) backend or while
/// encoding the records kept in it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to encode or decode stored record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Failure of a single call against the remote state service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered, but with a non-success status.
    #[error("server responded with HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// No usable response: timeout, DNS, connection reset or an undecodable body.
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ApiError {
    /// 401 and 404 both mean the token (or the account behind it) is gone.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 404, .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

/// Reasons an account registration is refused before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Account name is required.")]
    NameRequired,

    #[error("Name must be at least 3 characters long.")]
    NameTooShort,

    #[error("Name must be at most 50 characters long.")]
    NameTooLong,

    #[error("Name must be unique.")]
    NameTaken,

    #[error("Invalid UUID format.")]
    InvalidIdentifier,

    #[error("This account has already been added.")]
    AlreadyRegistered,

    #[error("You must provide the parent password.")]
    PasswordRequired,

    #[error("Password must be at most 40 characters long.")]
    PasswordTooLong,
}
