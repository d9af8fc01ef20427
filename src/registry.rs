use crate::cipher::{Cipher, issue_token, open_token};
use crate::consumer::Consumer;
use crate::error::{CallbackError, Error, Result};
use crate::login::LoginModeSelector;
use crate::rbac::{Role, RoleFactory};
use crate::record::parse_consumer_record;
use crate::session::{CONSUMER_KEY, Session, SessionStore, SessionValue, TOKEN_KEY};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client tag used for every login while multi-client mode is off.
pub const SINGLE_CLIENT_TAG: &str = "__x_x__once";

const DEFAULT_KEY_BITS: usize = 256;

type ClientTagFn = Arc<dyn Fn() -> String + Send + Sync>;

type RoleResolver =
    Arc<dyn Fn(&str, &RoleFactory) -> std::result::Result<Vec<Role>, CallbackError> + Send + Sync>;

/// Registry internals used by consumers and login selectors.
///
/// Kept apart from the public [`AuthRegistry`] surface.
#[async_trait]
pub(crate) trait Collaborator: Send + Sync {
    /// Returns whether `password` matches the temp account of `username`.
    fn temp_password_matches(&self, username: &str, password: &str) -> bool;

    /// Returns the client tag for a new login.
    fn next_client_tag(&self) -> String;

    /// Returns the token cipher.
    fn cipher(&self) -> &dyn Cipher;

    /// Binds a freshly verified consumer to a session.
    async fn join(&self, consumer: &Consumer) -> Result<()>;

    /// Looks up the session of a consumer.
    async fn session_of(&self, consumer: &Consumer) -> Result<Option<Arc<dyn Session>>>;

    /// Removes the session of a consumer.
    async fn ban(&self, consumer: &Consumer) -> Result<()>;
}

#[derive(Default)]
struct ClientPolicy {
    allow_many_client: bool,
    client_tag_fn: Option<ClientTagFn>,
    role_resolver: Option<RoleResolver>,
}

pub(crate) struct RegistryInner {
    me: Weak<RegistryInner>,
    store: Arc<dyn SessionStore>,
    cipher: Arc<dyn Cipher>,
    temp_accounts: RwLock<HashMap<String, String>>,
    policy: RwLock<ClientPolicy>,
    reset: futures::lock::Mutex<()>,
}

/// Central login and session coordinator.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AuthRegistry {
    inner: Arc<RegistryInner>,
}

/// Builder for [`AuthRegistry`].
pub struct AuthRegistryBuilder {
    store: Arc<dyn SessionStore>,
    cipher: Arc<dyn Cipher>,
    key_bits: usize,
    client_tag_fn: Option<ClientTagFn>,
    role_resolver: Option<RoleResolver>,
    temp_accounts: HashMap<String, String>,
}

impl AuthRegistryBuilder {
    /// Creates a builder with single-client mode and no role resolver.
    pub fn new<S, C>(store: S, cipher: C) -> Self
    where
        S: SessionStore + 'static,
        C: Cipher + 'static,
    {
        Self {
            store: Arc::new(store),
            cipher: Arc::new(cipher),
            key_bits: DEFAULT_KEY_BITS,
            client_tag_fn: None,
            role_resolver: None,
            temp_accounts: HashMap::new(),
        }
    }

    /// Sets the key size passed to [`Cipher::generate_key_pair`].
    pub fn key_bits(mut self, bits: usize) -> Self {
        self.key_bits = bits;
        self
    }

    /// Enables multi-client mode with the given client tag generator.
    pub fn allow_many_client<F>(mut self, client_tag_fn: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.client_tag_fn = Some(Arc::new(client_tag_fn));
        self
    }

    /// Installs the role resolver.
    pub fn role_check<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str, &RoleFactory) -> std::result::Result<Vec<Role>, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        self.role_resolver = Some(Arc::new(resolver));
        self
    }

    /// Adds a temp account.
    pub fn temp_account(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.temp_accounts.insert(username.into(), password.into());
        self
    }

    /// Generates the cipher keys and builds the registry.
    pub fn build(self) -> Result<AuthRegistry> {
        self.cipher
            .generate_key_pair(self.key_bits)
            .map_err(Error::Cipher)?;

        let policy = ClientPolicy {
            allow_many_client: self.client_tag_fn.is_some(),
            client_tag_fn: self.client_tag_fn,
            role_resolver: self.role_resolver,
        };
        let inner = Arc::new_cyclic(|me| RegistryInner {
            me: me.clone(),
            store: self.store,
            cipher: self.cipher,
            temp_accounts: RwLock::new(self.temp_accounts),
            policy: RwLock::new(policy),
            reset: futures::lock::Mutex::new(()),
        });
        Ok(AuthRegistry { inner })
    }
}

impl AuthRegistry {
    /// Returns a builder.
    pub fn builder<S, C>(store: S, cipher: C) -> AuthRegistryBuilder
    where
        S: SessionStore + 'static,
        C: Cipher + 'static,
    {
        AuthRegistryBuilder::new(store, cipher)
    }

    /// Starts a login.
    pub fn login(&self) -> LoginModeSelector {
        LoginModeSelector::new(self.inner.clone())
    }

    /// Returns whether the consumer has a live session.
    pub async fn is_login(&self, consumer: &Consumer) -> bool {
        self.inner.get_consumer(consumer.tag()).await.is_ok()
    }

    /// Returns whether the token opens to a tag with a live session.
    pub async fn is_login_with_token(&self, token: &str) -> bool {
        match open_token(self.inner.cipher(), token) {
            Ok(tag) => self.inner.get_consumer(&tag).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Loads the consumer stored under `tag`.
    pub async fn get_consumer(&self, tag: &str) -> Result<Consumer> {
        self.inner.get_consumer(tag).await
    }

    /// Loads the consumer a token was issued for.
    pub async fn get_consumer_with_token(&self, token: &str) -> Result<Consumer> {
        let tag = open_token(self.inner.cipher(), token)?;
        let consumer = self.inner.get_consumer(&tag).await?;
        if consumer.tag() != tag {
            return Err(Error::InvalidToken(format!(
                "token tag {tag} does not match session consumer {}",
                consumer.tag()
            )));
        }
        Ok(consumer)
    }

    /// Returns every consumer with a live session. Unreadable sessions are skipped.
    pub async fn get_all_consumer(&self) -> Vec<Consumer> {
        self.inner.get_all_consumer().await
    }

    /// Removes the consumer's session. A missing session is not an error.
    pub async fn ban(&self, consumer: &Consumer) -> Result<()> {
        self.inner.ban(consumer).await
    }

    /// Sets the session time-to-live.
    pub async fn set_expired(&self, ttl: Duration) -> Result<()> {
        self.inner.store.set_expire(ttl).await.map_err(Error::Store)
    }

    /// Disables multi-client mode and logs every consumer out.
    pub async fn set_un_allow_many_client(&self) {
        let _reset = self.inner.reset.lock().await;
        self.inner.policy.write().expect("poisoned lock").allow_many_client = false;
        self.inner.evict_all().await;
        info!("Multi-client login disabled");
    }

    /// Enables multi-client mode. `None` is rejected and leaves the mode unchanged.
    pub async fn set_allow_many_client<F>(&self, client_tag_fn: Option<F>)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        let Some(client_tag_fn) = client_tag_fn else {
            warn!("Multi-client login not enabled, no client tag generator supplied");
            return;
        };
        let _reset = self.inner.reset.lock().await;
        let mut policy = self.inner.policy.write().expect("poisoned lock");
        policy.allow_many_client = true;
        policy.client_tag_fn = Some(Arc::new(client_tag_fn));
        info!("Multi-client login enabled");
    }

    /// Adds or replaces a temp account, checked when a login supplies no password checker.
    pub fn add_temp_account(&self, username: impl Into<String>, password: impl Into<String>) {
        self.inner
            .temp_accounts
            .write()
            .expect("poisoned lock")
            .insert(username.into(), password.into());
    }

    /// Returns the other live consumers of the same username.
    pub async fn get_multi_consumer(&self, consumer: &Consumer) -> Vec<Consumer> {
        self.inner
            .get_all_consumer()
            .await
            .into_iter()
            .filter(|other| {
                other.username() == consumer.username()
                    && other.client_tag() != consumer.client_tag()
            })
            .collect()
    }

    /// Installs the role resolver.
    ///
    /// Every consumer is logged out and multi-client mode is turned off, so no
    /// session keeps roles granted under the previous resolver.
    pub async fn set_role_check<F>(&self, resolver: F)
    where
        F: Fn(&str, &RoleFactory) -> std::result::Result<Vec<Role>, CallbackError>
            + Send
            + Sync
            + 'static,
    {
        let _reset = self.inner.reset.lock().await;
        {
            let mut policy = self.inner.policy.write().expect("poisoned lock");
            policy.allow_many_client = false;
            policy.role_resolver = Some(Arc::new(resolver));
        }
        // Logins racing the eviction already see the new policy.
        self.inner.evict_all().await;
        info!("Role resolver installed, all consumers logged out");
    }

    /// Recomputes the consumer's roles. Without a resolver this does nothing.
    pub fn refresh_role(&self, consumer: &Consumer) -> Result<()> {
        self.inner.refresh_role(consumer)
    }
}

impl RegistryInner {
    fn refresh_role(&self, consumer: &Consumer) -> Result<()> {
        let resolver = self
            .policy
            .read()
            .expect("poisoned lock")
            .role_resolver
            .clone();
        let Some(resolver) = resolver else {
            return Ok(());
        };
        let roles = resolver(consumer.username(), &RoleFactory).map_err(Error::RoleResolver)?;
        debug!(tag = %consumer.tag(), roles = roles.len(), "Roles refreshed");
        consumer.set_roles(roles);
        Ok(())
    }

    fn allow_many_client(&self) -> bool {
        self.policy.read().expect("poisoned lock").allow_many_client
    }

    async fn get_consumer(&self, tag: &str) -> Result<Consumer> {
        let Some(session) = self.store.session(tag).await? else {
            return Err(Error::SessionNotFound {
                tag: tag.to_string(),
            });
        };
        self.load_consumer(session.as_ref()).await
    }

    async fn load_consumer(&self, session: &dyn Session) -> Result<Consumer> {
        match session.load(CONSUMER_KEY).await? {
            Some(SessionValue::Consumer(consumer)) => Ok(consumer),
            Some(SessionValue::Record(record)) => self.reconstruct(record),
            Some(SessionValue::Text(_)) => Err(Error::Serialization(format!(
                "session {} holds text where a consumer was expected",
                session.id()
            ))),
            None => Err(Error::SessionNotFound {
                tag: session.id().to_string(),
            }),
        }
    }

    fn reconstruct(&self, record: serde_json::Value) -> Result<Consumer> {
        let (record, roles) = parse_consumer_record(record)?;
        let registry: Weak<dyn Collaborator> = self.me.clone();
        Ok(Consumer::restore(registry, record, roles))
    }

    async fn get_all_consumer(&self) -> Vec<Consumer> {
        let sessions = match self.store.all_sessions().await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(error = %err, "Failed to list sessions");
                return Vec::new();
            }
        };

        let mut consumers = Vec::with_capacity(sessions.len());
        for session in sessions {
            match self.load_consumer(session.as_ref()).await {
                Ok(consumer) => consumers.push(consumer),
                Err(err) => {
                    warn!(session = %session.id(), error = %err, "Skipping unreadable session")
                }
            }
        }
        consumers
    }

    async fn evict_all(&self) {
        for consumer in self.get_all_consumer().await {
            if let Err(err) = Collaborator::ban(self, &consumer).await {
                warn!(tag = %consumer.tag(), error = %err, "Failed to log out consumer");
            }
        }
    }
}

#[async_trait]
impl Collaborator for RegistryInner {
    fn temp_password_matches(&self, username: &str, password: &str) -> bool {
        self.temp_accounts
            .read()
            .expect("poisoned lock")
            .get(username)
            .is_some_and(|stored| stored == password)
    }

    fn next_client_tag(&self) -> String {
        let policy = self.policy.read().expect("poisoned lock");
        match (&policy.client_tag_fn, policy.allow_many_client) {
            (Some(client_tag_fn), true) => client_tag_fn(),
            _ => SINGLE_CLIENT_TAG.to_string(),
        }
    }

    fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    async fn join(&self, consumer: &Consumer) -> Result<()> {
        let tag = consumer.tag();
        match self.store.session(tag).await? {
            None => {
                self.refresh_role(consumer)?;
                let token = issue_token(self.cipher(), tag)?;
                let session = self.store.register_session(tag).await?;
                session
                    .store(CONSUMER_KEY, SessionValue::Consumer(consumer.clone()))
                    .await?;
                session.store(TOKEN_KEY, SessionValue::Text(token)).await?;
                info!(tag = %tag, "Session created");
            }
            Some(session) if !self.allow_many_client() => {
                self.refresh_role(consumer)?;
                let token = issue_token(self.cipher(), tag)?;
                session
                    .store(CONSUMER_KEY, SessionValue::Consumer(consumer.clone()))
                    .await?;
                session.store(TOKEN_KEY, SessionValue::Text(token)).await?;
                debug!(tag = %tag, "Token re-issued for existing session");
            }
            Some(_) => {}
        }
        Ok(())
    }

    async fn session_of(&self, consumer: &Consumer) -> Result<Option<Arc<dyn Session>>> {
        Ok(self.store.session(consumer.tag()).await?)
    }

    async fn ban(&self, consumer: &Consumer) -> Result<()> {
        if let Some(session) = self.store.session(consumer.tag()).await? {
            self.store.unregister_session(session.as_ref()).await?;
            info!(tag = %consumer.tag(), "Consumer logged out");
        }
        Ok(())
    }
}
