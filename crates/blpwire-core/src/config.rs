//! Terminal connection and polling configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BLPWIRE_HOST` | `localhost` | Terminal host |
//! | `BLPWIRE_PORT` | `8194` | Terminal port |
//! | `BLPWIRE_POLL_TIMEOUT_MS` | `500` | Per-poll timeout |
//! | `BLPWIRE_MAX_STATUS_POLLS` | `64` | Re-poll budget for subscription status/admin events |

use std::env;
use std::time::Duration;

use crate::error::ValidationError;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8194;
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_STATUS_POLLS: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalConfig {
    pub host: String,
    pub port: u16,
    /// Timeout for each `next_event` call, re-armed every iteration.
    pub poll_timeout: Duration,
    /// How many consecutive non-data events one subscription poll may consume.
    pub max_status_polls: u32,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            max_status_polls: DEFAULT_MAX_STATUS_POLLS,
        }
    }
}

impl TerminalConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Loads configuration from `BLPWIRE_*` variables, falling back to defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("BLPWIRE_HOST") {
            let host = host.trim();
            if host.is_empty() {
                return Err(ValidationError::InvalidConfig {
                    name: "BLPWIRE_HOST",
                    value: host.to_owned(),
                });
            }
            config.host = host.to_owned();
        }
        if let Some(port) = lookup("BLPWIRE_PORT") {
            config.port = parse_var("BLPWIRE_PORT", &port)?;
        }
        if let Some(timeout) = lookup("BLPWIRE_POLL_TIMEOUT_MS") {
            let millis: u64 = parse_var("BLPWIRE_POLL_TIMEOUT_MS", &timeout)?;
            config.poll_timeout = Duration::from_millis(millis);
        }
        if let Some(budget) = lookup("BLPWIRE_MAX_STATUS_POLLS") {
            config.max_status_polls = parse_var("BLPWIRE_MAX_STATUS_POLLS", &budget)?;
        }

        Ok(config)
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    pub fn with_max_status_polls(mut self, max_status_polls: u32) -> Self {
        self.max_status_polls = max_status_polls;
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidConfig {
            name,
            value: raw.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_match_local_terminal() {
        let config = TerminalConfig::from_lookup(lookup_from(&[])).expect("defaults");
        assert_eq!(config.address(), "localhost:8194");
        assert_eq!(config.poll_timeout, Duration::from_millis(500));
    }

    #[test]
    fn reads_overrides_from_environment() {
        let config = TerminalConfig::from_lookup(lookup_from(&[
            ("BLPWIRE_HOST", "terminal.internal"),
            ("BLPWIRE_PORT", "8196"),
            ("BLPWIRE_POLL_TIMEOUT_MS", "250"),
        ]))
        .expect("config");
        assert_eq!(config.address(), "terminal.internal:8196");
        assert_eq!(config.poll_timeout, Duration::from_millis(250));
        assert_eq!(config.max_status_polls, DEFAULT_MAX_STATUS_POLLS);
    }

    #[test]
    fn rejects_unparseable_port() {
        let err = TerminalConfig::from_lookup(lookup_from(&[("BLPWIRE_PORT", "eighty")]))
            .expect_err("must fail");
        assert!(matches!(
            err,
            ValidationError::InvalidConfig {
                name: "BLPWIRE_PORT",
                ..
            }
        ));
    }
}
