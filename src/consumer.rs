use crate::cipher::open_token;
use crate::error::{Error, Result};
use crate::rbac::{Role, count_matches};
use crate::record::ConsumerRecord;
use crate::registry::Collaborator;
use crate::session::{Session, SessionValue, TOKEN_KEY};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

const DATA_KEY_PREFIX: &str = "data:";

/// Authenticated principal bound to one session.
///
/// Cloning yields another handle to the same consumer; a role refresh through
/// any handle is visible through all of them.
///
/// A consumer obtained from a login reflects the session at that moment. When
/// single-client mode re-issues the token for the same slot, earlier handles
/// are not updated; fetch the consumer again through the registry instead of
/// holding on to it.
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

struct ConsumerInner {
    registry: Weak<dyn Collaborator>,
    tag: String,
    client_tag: String,
    full_tag: String,
    roles: RwLock<Arc<[Role]>>,
    role_writer: Mutex<()>,
}

impl Consumer {
    pub(crate) fn new(
        registry: Weak<dyn Collaborator>,
        tag: impl Into<String>,
        client_tag: impl Into<String>,
    ) -> Self {
        let tag = tag.into();
        let client_tag = client_tag.into();
        let full_tag = format!("{tag}{client_tag}");
        Self::from_parts(registry, tag, client_tag, full_tag, Vec::new())
    }

    /// Rebuilds a consumer parsed from a generic record and rebinds it to `registry`.
    pub(crate) fn restore(
        registry: Weak<dyn Collaborator>,
        record: ConsumerRecord,
        roles: Vec<Role>,
    ) -> Self {
        Self::from_parts(
            registry,
            record.tag,
            record.client_tag,
            record.full_tag,
            roles,
        )
    }

    fn from_parts(
        registry: Weak<dyn Collaborator>,
        tag: String,
        client_tag: String,
        full_tag: String,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                registry,
                tag,
                client_tag,
                full_tag,
                roles: RwLock::new(roles.into()),
                role_writer: Mutex::new(()),
            }),
        }
    }

    /// Returns the full tag (username plus client tag), the session key.
    pub fn tag(&self) -> &str {
        &self.inner.full_tag
    }

    /// Returns the stable identity tag.
    pub fn username(&self) -> &str {
        &self.inner.tag
    }

    /// Returns the per-login client tag.
    pub fn client_tag(&self) -> &str {
        &self.inner.client_tag
    }

    /// Returns the token currently issued for this consumer's session.
    pub async fn token(&self) -> Result<String> {
        let session = self.session().await?;
        let token = session.load(TOKEN_KEY).await?;
        token
            .as_ref()
            .and_then(SessionValue::as_text)
            .map(str::to_string)
            .ok_or_else(|| self.not_found())
    }

    /// Checks `candidate` against the token currently issued for this session.
    ///
    /// Both tokens must decrypt to the same tag and the candidate must be the
    /// live token, so a token superseded by a later login is refused. Any
    /// failure yields `false`.
    pub async fn check_token(&self, candidate: &str) -> bool {
        match self.verify_token(candidate).await {
            Ok(valid) => valid,
            Err(err) => {
                tracing::warn!(tag = %self.tag(), error = %err, "Token check failed");
                false
            }
        }
    }

    async fn verify_token(&self, candidate: &str) -> Result<bool> {
        let current = self.token().await?;
        let registry = self.registry()?;
        let current_tag = open_token(registry.cipher(), &current)?;
        let candidate_tag = open_token(registry.cipher(), candidate)?;
        Ok(current_tag == candidate_tag && current == candidate)
    }

    /// Returns the current role set.
    pub fn roles(&self) -> Arc<[Role]> {
        self.inner.roles.read().expect("poisoned lock").clone()
    }

    /// Returns whether the consumer holds all roles named in `names`.
    ///
    /// Uses the same shared-counter rule as [`Role::exist`].
    pub fn role_exist<I, N>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let names: Vec<N> = names.into_iter().collect();
        let roles = self.roles();
        count_matches(roles.iter(), &names, |role, name| role.name() == name)
    }

    /// Returns whether the consumer's roles, taken together, grant all of `uris`.
    ///
    /// The counter is shared across every group of every role.
    pub fn resource_exist<I, U>(&self, uris: I) -> bool
    where
        I: IntoIterator<Item = U>,
        U: AsRef<str>,
    {
        let uris: Vec<U> = uris.into_iter().collect();
        let roles = self.roles();
        count_matches(
            roles.iter().flat_map(|role| role.resource_groups()),
            &uris,
            |group, uri| group.exist(uri),
        )
    }

    /// Stores a value in this consumer's session.
    pub async fn store(&self, key: &str, value: SessionValue) -> Result<()> {
        let session = self.session().await?;
        session.store(&data_key(key), value).await?;
        Ok(())
    }

    /// Loads a value from this consumer's session.
    pub async fn load(&self, key: &str) -> Result<Option<SessionValue>> {
        let session = self.session().await?;
        Ok(session.load(&data_key(key)).await?)
    }

    /// Deletes a value from this consumer's session.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let session = self.session().await?;
        session.delete(&data_key(key)).await?;
        Ok(())
    }

    /// Logs this consumer out by removing its session.
    pub async fn out_login(&self) -> Result<()> {
        self.registry()?.ban(self).await
    }

    /// Replaces the whole role set.
    pub(crate) fn set_roles(&self, roles: Vec<Role>) {
        let _writer = self.inner.role_writer.lock().expect("poisoned lock");
        let roles: Arc<[Role]> = roles.into();
        *self.inner.roles.write().expect("poisoned lock") = roles;
    }

    fn registry(&self) -> Result<Arc<dyn Collaborator>> {
        self.inner.registry.upgrade().ok_or(Error::RegistryDropped)
    }

    async fn session(&self) -> Result<Arc<dyn Session>> {
        self.registry()?
            .session_of(self)
            .await?
            .ok_or_else(|| self.not_found())
    }

    fn not_found(&self) -> Error {
        Error::SessionNotFound {
            tag: self.tag().to_string(),
        }
    }
}

fn data_key(key: &str) -> String {
    format!("{DATA_KEY_PREFIX}{key}")
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("tag", &self.inner.tag)
            .field("client_tag", &self.inner.client_tag)
            .field("full_tag", &self.inner.full_tag)
            .field("roles", &self.roles())
            .finish()
    }
}

impl Serialize for Consumer {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let roles = self.roles();
        let mut state = serializer.serialize_struct("Consumer", 4)?;
        state.serialize_field("Tag", &self.inner.tag)?;
        state.serialize_field("ClientTag", &self.inner.client_tag)?;
        state.serialize_field("FullTag", &self.inner.full_tag)?;
        state.serialize_field("Roles", &*roles)?;
        state.end()
    }
}
