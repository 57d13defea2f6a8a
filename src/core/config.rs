//! Proxy configuration.
//!
//! [`ProxyConfig`] is the surface the session and multiplexer consume. How it
//! gets populated (environment, file, flags) is the caller's concern; the
//! `eppmux` binary fills it from environment variables.

use std::time::Duration;

use super::constants::{DEFAULT_EPP_PORT, DEFAULT_EXCHANGE_TIMEOUT};

/// Configuration for the upstream EPP session and the proxy.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Remote EPP server hostname.
    pub remote_host: String,

    /// Remote EPP server port.
    pub remote_port: u16,

    /// Wrap the upstream connection in TLS.
    pub use_tls: bool,

    /// Client identifier sent in the login command.
    pub client_id: String,

    /// Password sent in the login command.
    pub password: String,

    /// Deadline for any single request/response exchange. Also bounds each
    /// startup step (connect, greeting, login).
    pub timeout: Duration,

    /// Object-service URIs to declare at login. When empty, every `objURI`
    /// found in the upstream greeting's service menu is declared instead.
    pub service_uris: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            remote_host: "127.0.0.1".to_string(),
            remote_port: DEFAULT_EPP_PORT,
            use_tls: false,
            client_id: String::new(),
            password: String::new(),
            timeout: DEFAULT_EXCHANGE_TIMEOUT,
            service_uris: Vec::new(),
        }
    }
}

/// Builder for creating a [`ProxyConfig`].
#[derive(Debug, Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the remote host.
    pub fn remote_host(mut self, host: impl Into<String>) -> Self {
        self.config.remote_host = host.into();
        self
    }

    /// Set the remote port.
    pub fn remote_port(mut self, port: u16) -> Self {
        self.config.remote_port = port;
        self
    }

    /// Enable or disable TLS on the upstream connection.
    pub fn use_tls(mut self, tls: bool) -> Self {
        self.config.use_tls = tls;
        self
    }

    /// Set the login credentials.
    pub fn credentials(mut self, client_id: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.client_id = client_id.into();
        self.config.password = password.into();
        self
    }

    /// Set the exchange timeout in whole seconds.
    ///
    /// Non-positive values fall back to the default of 5 seconds.
    pub fn timeout_secs(mut self, secs: i64) -> Self {
        self.config.timeout = if secs > 0 {
            Duration::from_secs(secs as u64)
        } else {
            DEFAULT_EXCHANGE_TIMEOUT
        };
        self
    }

    /// Set the exchange timeout directly.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = if timeout.is_zero() {
            DEFAULT_EXCHANGE_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Set the object-service URIs to declare at login.
    pub fn service_uris(mut self, uris: Vec<String>) -> Self {
        self.config.service_uris = uris;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyConfig {
        self.config
    }
}
