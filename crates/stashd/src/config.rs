//! stashd.toml configuration.
//!
//! Every field is optional; command-line flags override file values.
//!
//! ```toml
//! listen = "0.0.0.0:8080"
//!
//! [locking]
//! poll_interval_ms = 1000
//! max_retries = 120
//!
//! [auth]
//! mode = "static"
//!
//! [[auth.credentials]]
//! username = "ci"
//! secret_sha256 = "2bb80d53..."
//! namespace = "platform"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stash_api::LockPolicy;
use stash_auth::{NamespaceResolver, PassthroughResolver, StaticCredential, StaticResolver};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StashConfig {
    pub listen: Option<SocketAddr>,
    pub max_body_bytes: Option<usize>,
    #[serde(default)]
    pub locking: LockingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LockingConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    #[serde(default)]
    pub credentials: Vec<StaticCredential>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Username is the namespace; secrets are not checked.
    #[default]
    Passthrough,
    /// Only credentials listed in `auth.credentials` are accepted.
    Static,
}

impl StashConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StashConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        match self.listen {
            Some(addr) => Ok(addr),
            None => Ok(DEFAULT_LISTEN.parse()?),
        }
    }

    pub fn lock_policy(&self) -> LockPolicy {
        let defaults = LockPolicy::default();
        LockPolicy {
            poll_interval: self
                .locking
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            max_retries: self.locking.max_retries.unwrap_or(defaults.max_retries),
        }
    }

    pub fn resolver(&self) -> anyhow::Result<Arc<dyn NamespaceResolver>> {
        match self.auth.mode {
            AuthMode::Passthrough => Ok(Arc::new(PassthroughResolver)),
            AuthMode::Static => {
                if self.auth.credentials.is_empty() {
                    anyhow::bail!(
                        "auth mode \"static\" needs at least one [[auth.credentials]] entry"
                    );
                }
                Ok(Arc::new(StaticResolver::new(self.auth.credentials.clone())))
            }
        }
    }
}
