//! Login, session binding and role/resource authorization.
//!
//! An [`AuthRegistry`] verifies credentials, binds each successful login to a
//! session in a pluggable [`SessionStore`] and issues an opaque token minted
//! by a pluggable [`Cipher`]. Permissions are modelled as [`Role`]s made of
//! [`ResourceGroup`]s of URI-identified [`Resource`]s.
//!
//! # Examples
//!
//! Temp-account login with the in-memory store and AES cipher (default features):
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "aes-cipher"))]
//! # futures::executor::block_on(async {
//! use kkit_auth::{AesCipher, AuthRegistry, MemorySessionStore};
//! let registry = AuthRegistry::builder(MemorySessionStore::new(), AesCipher::new())
//!     .temp_account("admin", "12345")
//!     .build()
//!     .unwrap();
//! let consumer = registry.login().password("admin", "12345").await.unwrap();
//! let token = consumer.token().await.unwrap();
//! assert!(consumer.check_token(&token).await);
//! # });
//! ```
//!
//! Installing a role resolver:
//! ```no_run
//! # #[cfg(all(feature = "memory-store", feature = "aes-cipher"))]
//! # futures::executor::block_on(async {
//! use kkit_auth::{AesCipher, AuthRegistry, MemorySessionStore};
//! let registry = AuthRegistry::builder(MemorySessionStore::new(), AesCipher::new())
//!     .build()
//!     .unwrap();
//! registry
//!     .set_role_check(|_username, factory| {
//!         Ok(vec![factory.new_role("viewer").add_resource_group([factory
//!             .new_resource_group("pages")
//!             .add([factory.new_resource("home", "/hi")])])])
//!     })
//!     .await;
//! # });
//! ```
#![forbid(unsafe_code)]

mod cipher;
mod consumer;
mod error;
mod login;
mod rbac;
mod record;
mod registry;
mod session;
#[cfg(feature = "aes-cipher")]
mod aes_cipher;

#[cfg(feature = "memory-store")]
mod memory_store;

pub use crate::cipher::Cipher;
pub use crate::consumer::Consumer;
pub use crate::error::{CallbackError, CipherError, Error, Result, StoreError};
pub use crate::login::{LoginModeSelector, PasswordChecker};
pub use crate::rbac::{Resource, ResourceGroup, Role, RoleFactory};
pub use crate::registry::{AuthRegistry, AuthRegistryBuilder, SINGLE_CLIENT_TAG};
pub use crate::session::{CONSUMER_KEY, Session, SessionStore, SessionValue, TOKEN_KEY};

#[cfg(feature = "aes-cipher")]
pub use crate::aes_cipher::AesCipher;

#[cfg(feature = "memory-store")]
pub use crate::memory_store::{MemorySession, MemorySessionStore};
