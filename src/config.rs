//! Server configuration.
//!
//! Read from a TOML document, from `RESTKIT_*` environment variables, or
//! built in code. Missing keys fall back to the defaults.
//!
//! ```toml
//! addr = "0.0.0.0:8080"
//! max_body_bytes = 1048576
//! shutdown_grace_secs = 10
//! ```

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// `host:port` to listen on.
    pub addr: String,
    /// Request bodies larger than this are refused with `413`.
    pub max_body_bytes: usize,
    /// How long in-flight connections may run after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_owned(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
        }
    }
}

impl Config {
    pub fn from_toml(src: &str) -> Result<Self, Error> {
        Ok(toml::from_str(src)?)
    }

    /// Reads `RESTKIT_ADDR`, `RESTKIT_MAX_BODY_BYTES` and
    /// `RESTKIT_SHUTDOWN_GRACE_SECS`.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(addr) = lookup("RESTKIT_ADDR") {
            config.addr = addr;
        }
        if let Some(value) = lookup("RESTKIT_MAX_BODY_BYTES") {
            config.max_body_bytes = value
                .parse()
                .map_err(|_| Error::Env { key: "RESTKIT_MAX_BODY_BYTES", value })?;
        }
        if let Some(value) = lookup("RESTKIT_SHUTDOWN_GRACE_SECS") {
            config.shutdown_grace_secs = value
                .parse()
                .map_err(|_| Error::Env { key: "RESTKIT_SHUTDOWN_GRACE_SECS", value })?;
        }
        Ok(config)
    }
}
