//! Server configuration.
//!
//! Defaults bound slow clients: 10 s to read request headers, 15 s to
//! produce a response, 15 s of keep-alive idleness, 30 s to drain on
//! shutdown, 2 MiB of request body. Only the port comes from the
//! environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::error::Error;

/// Environment variable holding the listen port.
pub const PORT_ENV: &str = "PORT";

pub const DEFAULT_PORT: u16 = 8080;

/// Largest request body buffered before answering `413`.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// What the lifecycle manager does when the accept loop dies after startup.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListenerFailure {
    /// Log the failure and keep waiting for the shutdown signal. Health
    /// stays Up.
    #[default]
    LogOnly,
    /// Treat the failure as a shutdown trigger and surface it as
    /// [`Error::Listener`].
    Shutdown,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub shutdown_timeout: Duration,
    pub max_body_size: usize,
    pub listener_failure: ListenerFailure,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            listener_failure: ListenerFailure::LogOnly,
        }
    }
}

impl ServerConfig {
    /// Defaults, with the port taken from `PORT` when it is set.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        if let Some(raw) = lookup(PORT_ENV) {
            let raw = raw.trim();
            if !raw.is_empty() {
                config.port = raw
                    .parse()
                    .map_err(|e| Error::Config(format!("{PORT_ENV}={raw:?}: {e}")))?;
            }
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    #[must_use]
    pub fn with_listener_failure(mut self, policy: ListenerFailure) -> Self {
        self.listener_failure = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v).to_owned())
    }

    #[test]
    fn defaults_bind_loopback_with_fixed_timeouts() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.write_timeout, Duration::from_secs(15));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.max_body_size, 2 * 1024 * 1024);
        assert_eq!(config.listener_failure, ListenerFailure::LogOnly);
    }

    #[test]
    fn port_comes_from_env() {
        let config = ServerConfig::from_lookup(env(&[("PORT", "9091")])).unwrap();
        assert_eq!(config.port, 9091);
        assert!(config.host.is_loopback());
    }

    #[test]
    fn missing_or_blank_port_uses_default() {
        assert_eq!(ServerConfig::from_lookup(env(&[])).unwrap().port, DEFAULT_PORT);
        assert_eq!(
            ServerConfig::from_lookup(env(&[("PORT", "  ")])).unwrap().port,
            DEFAULT_PORT
        );
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let err = ServerConfig::from_lookup(env(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("PORT")));
        assert!(ServerConfig::from_lookup(env(&[("PORT", "70000")])).is_err());
    }
}
