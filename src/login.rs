use crate::consumer::Consumer;
use crate::error::{CallbackError, Error, Result};
use crate::registry::Collaborator;
use std::sync::Arc;
use tracing::info;

/// Verifies a username and password pair.
pub type PasswordChecker =
    Box<dyn Fn(&str, &str) -> std::result::Result<(), CallbackError> + Send + Sync>;

/// Login builder returned by [`crate::AuthRegistry::login`].
///
/// With no checker installed, [`LoginModeSelector::password`] verifies
/// against the registry's temp accounts. Once a checker is installed, only
/// the checkers decide.
pub struct LoginModeSelector {
    registry: Arc<dyn Collaborator>,
    checkers: Vec<PasswordChecker>,
}

impl LoginModeSelector {
    pub(crate) fn new(registry: Arc<dyn Collaborator>) -> Self {
        Self {
            registry,
            checkers: Vec::new(),
        }
    }

    /// Adds a password checker. All checkers must accept, in the order added.
    pub fn use_password_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&str, &str) -> std::result::Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.checkers.push(Box::new(checker));
        self
    }

    /// Adds several password checkers at once.
    pub fn use_password_checkers(
        mut self,
        checkers: impl IntoIterator<Item = PasswordChecker>,
    ) -> Self {
        self.checkers.extend(checkers);
        self
    }

    /// Logs in with a password and returns a consumer bound to a live session.
    pub async fn password(self, username: &str, password: &str) -> Result<Consumer> {
        self.verify(username, password)?;

        let client_tag = self.registry.next_client_tag();
        let consumer = Consumer::new(Arc::downgrade(&self.registry), username, client_tag);
        self.registry.join(&consumer).await?;
        info!(tag = %consumer.tag(), "Consumer logged in");
        Ok(consumer)
    }

    fn verify(&self, username: &str, password: &str) -> Result<()> {
        if self.checkers.is_empty() {
            return if self.registry.temp_password_matches(username, password) {
                Ok(())
            } else {
                Err(Error::InvalidCredentials)
            };
        }
        for checker in &self.checkers {
            checker(username, password).map_err(Error::CheckerRejected)?;
        }
        Ok(())
    }
}
