//! Resolver that uses the username as the namespace.

use crate::{AuthError, NamespaceResolver};

/// Ignores the secret; every username is its own namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl NamespaceResolver for PassthroughResolver {
    fn resolve(&self, username: &str, _secret: &str) -> Result<String, AuthError> {
        Ok(username.to_string())
    }
}
