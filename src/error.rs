use thiserror::Error;

/// Session-store collaborator error type.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Crypto collaborator error type.
pub type CipherError = Box<dyn std::error::Error + Send + Sync>;

/// Error returned by password checkers and role resolvers.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown account or wrong password. The two cases are not distinguished.
    #[error("the account does not exist or the login password is wrong")]
    InvalidCredentials,
    /// A custom password checker refused the login.
    #[error("credentials rejected: {0}")]
    CheckerRejected(#[source] CallbackError),
    /// No live session exists for the tag.
    #[error("no session found for consumer {tag}")]
    SessionNotFound { tag: String },
    /// Token could not be decoded, decrypted or matched to its session.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// Key generation, encryption or decryption failed.
    #[error("cipher error: {0}")]
    Cipher(#[source] CipherError),
    /// A stored consumer record could not be parsed back.
    #[error("malformed consumer record: {0}")]
    Serialization(String),
    /// Session-store error wrapper.
    #[error("store error: {0}")]
    Store(#[source] StoreError),
    /// The role-resolution callback failed.
    #[error("role resolver error: {0}")]
    RoleResolver(#[source] CallbackError),
    /// The registry a consumer was issued by no longer exists.
    #[error("auth registry has been dropped")]
    RegistryDropped,
}

impl Error {
    /// Returns true for both the uniform credential error and checker rejections.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, Self::InvalidCredentials | Self::CheckerRejected(_))
    }
}

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
