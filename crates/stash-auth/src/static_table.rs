//! Resolver backed by a fixed credential table.
//!
//! Secrets are stored as lowercase hex SHA-256 digests, so a config file
//! listing credentials never holds plaintext secrets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{AuthError, NamespaceResolver};

/// One credential entry, as it appears in the daemon config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaticCredential {
    pub username: String,
    /// Hex-encoded SHA-256 of the secret.
    pub secret_sha256: String,
    pub namespace: String,
}

impl StaticCredential {
    /// Build an entry from a plaintext secret.
    pub fn from_secret(username: &str, secret: &str, namespace: &str) -> Self {
        Self {
            username: username.to_string(),
            secret_sha256: digest_hex(secret),
            namespace: namespace.to_string(),
        }
    }
}

/// Looks credentials up by username and checks the secret digest.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, StaticCredential>,
}

impl StaticResolver {
    /// Later entries for the same username replace earlier ones.
    pub fn new(credentials: impl IntoIterator<Item = StaticCredential>) -> Self {
        let entries = credentials
            .into_iter()
            .map(|c| {
                let normalized = StaticCredential {
                    secret_sha256: c.secret_sha256.to_ascii_lowercase(),
                    ..c
                };
                (normalized.username.clone(), normalized)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NamespaceResolver for StaticResolver {
    fn resolve(&self, username: &str, secret: &str) -> Result<String, AuthError> {
        let entry = self
            .entries
            .get(username)
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

        if digest_hex(secret) != entry.secret_sha256 {
            debug!(%username, "secret digest mismatch");
            return Err(AuthError::InvalidSecret(username.to_string()));
        }
        Ok(entry.namespace.clone())
    }
}

fn digest_hex(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
