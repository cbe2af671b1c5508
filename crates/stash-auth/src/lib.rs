//! stash-auth — namespace resolution for stash.
//!
//! A [`NamespaceResolver`] turns a username and secret into the namespace
//! that scopes every state record the caller touches. Storage and locking
//! never see raw credentials.
//!
//! Two resolvers ship with the crate:
//! - [`PassthroughResolver`] uses the username as the namespace and ignores
//!   the secret. Local use only.
//! - [`StaticResolver`] looks credentials up in a fixed table of SHA-256
//!   secret digests. Several credentials may map to one namespace.

pub mod passthrough;
pub mod static_table;

pub use passthrough::PassthroughResolver;
pub use static_table::{StaticCredential, StaticResolver};

use thiserror::Error;

/// Why a credential pair was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("invalid secret for user: {0}")]
    InvalidSecret(String),
}

/// Maps credentials to a namespace.
pub trait NamespaceResolver: Send + Sync {
    fn resolve(&self, username: &str, secret: &str) -> Result<String, AuthError>;
}
