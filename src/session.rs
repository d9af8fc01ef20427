use crate::consumer::Consumer;
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Session key holding the consumer itself.
pub const CONSUMER_KEY: &str = "consumer";

/// Session key holding the token currently issued for the session.
pub const TOKEN_KEY: &str = "token";

/// Value kept in a session.
///
/// Process-local stores can hand back the typed [`Consumer`]. Stores that
/// serialize values return a generic [`SessionValue::Record`] instead and the
/// registry rebuilds the consumer from it.
#[derive(Debug, Clone)]
pub enum SessionValue {
    /// Live consumer handle.
    Consumer(Consumer),
    /// Plain text such as a token.
    Text(String),
    /// Generic record materialized by a serializing backend.
    Record(serde_json::Value),
}

impl SessionValue {
    /// Returns the text payload, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Record(serde_json::Value::String(text)) => Some(text),
            _ => None,
        }
    }
}

/// A key/value session bound to one consumer.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns the session key.
    fn id(&self) -> &str;

    /// Stores a value, replacing any previous one under `key`.
    async fn store(&self, key: &str, value: SessionValue) -> std::result::Result<(), StoreError>;

    /// Loads a value. Missing keys yield `None`.
    async fn load(&self, key: &str) -> std::result::Result<Option<SessionValue>, StoreError>;

    /// Deletes a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError>;
}

/// Session storage backend, expected to be safe for concurrent use.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up a live session. Missing or expired sessions yield `None`.
    async fn session(&self, key: &str)
    -> std::result::Result<Option<Arc<dyn Session>>, StoreError>;

    /// Creates a session under `key`.
    async fn register_session(&self, key: &str)
    -> std::result::Result<Arc<dyn Session>, StoreError>;

    /// Removes a session.
    async fn unregister_session(&self, session: &dyn Session)
    -> std::result::Result<(), StoreError>;

    /// Returns every live session.
    async fn all_sessions(&self) -> std::result::Result<Vec<Arc<dyn Session>>, StoreError>;

    /// Configures the session time-to-live.
    async fn set_expire(&self, ttl: Duration) -> std::result::Result<(), StoreError>;
}
