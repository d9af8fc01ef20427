use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::{Session, SessionStore, SessionValue};

/// In-memory session store for tests and single-process deployments.
///
/// Sessions expire once they have not been looked up for longer than the
/// configured TTL. Expired sessions behave as absent and are pruned lazily.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: RwLock<HashMap<String, Arc<MemorySession>>>,
    ttl: RwLock<Option<Duration>>,
    serialize_values: bool,
}

/// Session held by [`MemorySessionStore`].
#[derive(Debug)]
pub struct MemorySession {
    id: String,
    values: RwLock<HashMap<String, SessionValue>>,
    touched_at: Mutex<Instant>,
    serialize_values: bool,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that keeps consumers as generic records, the way a
    /// remote backend hands them back.
    pub fn with_serialized_values() -> Self {
        Self {
            inner: Arc::new(Inner {
                serialize_values: true,
                ..Inner::default()
            }),
        }
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.prune_expired();
        self.inner.sessions.read().expect("poisoned lock").len()
    }

    /// Returns true when no live session exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ttl(&self) -> Option<Duration> {
        *self.inner.ttl.read().expect("poisoned lock")
    }

    fn is_expired(session: &MemorySession, ttl: Duration, now: Instant) -> bool {
        let touched_at = *session.touched_at.lock().expect("poisoned lock");
        now.saturating_duration_since(touched_at) > ttl
    }

    /// Drops `key` only while it still maps to the expired `session`.
    fn remove_expired(&self, key: &str, session: &Arc<MemorySession>) {
        let mut sessions = self.inner.sessions.write().expect("poisoned lock");
        if sessions
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, session))
        {
            sessions.remove(key);
        }
    }

    fn prune_expired(&self) {
        let Some(ttl) = self.ttl() else {
            return;
        };
        let now = Instant::now();
        self.inner
            .sessions
            .write()
            .expect("poisoned lock")
            .retain(|_, session| !Self::is_expired(session, ttl, now));
    }
}

impl MemorySession {
    fn new(id: &str, serialize_values: bool) -> Self {
        Self {
            id: id.to_string(),
            values: RwLock::new(HashMap::new()),
            touched_at: Mutex::new(Instant::now()),
            serialize_values,
        }
    }

    fn touch(&self) {
        *self.touched_at.lock().expect("poisoned lock") = Instant::now();
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn store(&self, key: &str, value: SessionValue) -> std::result::Result<(), StoreError> {
        let value = match value {
            SessionValue::Consumer(consumer) if self.serialize_values => {
                SessionValue::Record(serde_json::to_value(&consumer)?)
            }
            other => other,
        };
        self.values
            .write()
            .expect("poisoned lock")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> std::result::Result<Option<SessionValue>, StoreError> {
        Ok(self.values.read().expect("poisoned lock").get(key).cloned())
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), StoreError> {
        self.values.write().expect("poisoned lock").remove(key);
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn session(
        &self,
        key: &str,
    ) -> std::result::Result<Option<Arc<dyn Session>>, StoreError> {
        let found = self
            .inner
            .sessions
            .read()
            .expect("poisoned lock")
            .get(key)
            .cloned();
        let Some(session) = found else {
            return Ok(None);
        };

        if let Some(ttl) = self.ttl() {
            if Self::is_expired(&session, ttl, Instant::now()) {
                self.remove_expired(key, &session);
                return Ok(None);
            }
        }

        session.touch();
        Ok(Some(session as Arc<dyn Session>))
    }

    async fn register_session(
        &self,
        key: &str,
    ) -> std::result::Result<Arc<dyn Session>, StoreError> {
        let session = Arc::new(MemorySession::new(key, self.inner.serialize_values));
        self.inner
            .sessions
            .write()
            .expect("poisoned lock")
            .insert(key.to_string(), session.clone());
        Ok(session as Arc<dyn Session>)
    }

    async fn unregister_session(
        &self,
        session: &dyn Session,
    ) -> std::result::Result<(), StoreError> {
        self.inner
            .sessions
            .write()
            .expect("poisoned lock")
            .remove(session.id());
        Ok(())
    }

    async fn all_sessions(&self) -> std::result::Result<Vec<Arc<dyn Session>>, StoreError> {
        self.prune_expired();
        let guard = self.inner.sessions.read().expect("poisoned lock");
        Ok(guard
            .values()
            .map(|session| session.clone() as Arc<dyn Session>)
            .collect())
    }

    /// A zero TTL disables expiry.
    async fn set_expire(&self, ttl: Duration) -> std::result::Result<(), StoreError> {
        let mut guard = self.inner.ttl.write().expect("poisoned lock");
        *guard = (!ttl.is_zero()).then_some(ttl);
        Ok(())
    }
}
