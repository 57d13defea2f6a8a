//! # eppmux
//!
//! A protocol-level proxy for EPP (Extensible Provisioning Protocol, RFC
//! 5730), the length-prefixed-XML-over-TCP protocol used for provisioning
//! domain-registry objects.
//!
//! The proxy terminates any number of local client connections and forwards
//! their requests over a single, pre-authenticated, persistent connection to
//! one upstream EPP server. Session setup (TCP, TLS, greeting, login) is paid
//! once at startup; lightweight clients such as CGI scripts then connect
//! locally and speak plain EPP without per-request authentication.
//!
//! The proxy understands only the generic EPP envelope: length-prefixed
//! framing, `result` codes, transaction ids, the login/greeting shape. The
//! content of individual commands passes through untouched.
//!
//! ## Design
//!
//! - The upstream connection is a shared, stateful, ordered resource: at most
//!   one request is in flight at a time, and concurrent clients are serviced
//!   in FIFO order ([`upstream::UpstreamSession::exchange`]).
//! - Every exchange is bounded by a configured timeout. A timed-out or
//!   otherwise failed exchange leaves the connection desynchronized, so the
//!   session becomes terminally broken and the process exits; a supervisor
//!   is expected to restart it. Clients caught in the failure receive a
//!   well-formed EPP error frame (code 2500) first.
//! - Throughput is deliberately bounded by upstream round-trip latency;
//!   operators scale by running more proxy instances, not by parallelizing
//!   one proxy's upstream link.
//!
//! ## Modules
//!
//! - [`core`]: configuration, errors, protocol constants
//! - [`transport`]: length-prefixed frame codec and the upstream TCP/TLS stream
//! - [`envelope`]: envelope inspection and synthetic error responses
//! - [`upstream`]: session establishment and the serialized exchange path
//! - [`proxy`]: downstream listener and per-client serving
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use eppmux::core::ProxyConfigBuilder;
//! use eppmux::proxy::ProxyServer;
//! use eppmux::upstream::UpstreamSession;
//!
//! # async fn run() -> Result<(), eppmux::core::ProxyError> {
//! let config = ProxyConfigBuilder::new()
//!     .remote_host("epp.example.net")
//!     .remote_port(700)
//!     .use_tls(true)
//!     .credentials("registrar-1", "secret")
//!     .timeout_secs(5)
//!     .build();
//!
//! let session = Arc::new(UpstreamSession::establish(config).await?);
//! let server = ProxyServer::bind("127.0.0.1:7700", session).await?;
//! server.run().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod core;
pub mod envelope;
pub mod proxy;
pub mod transport;
pub mod upstream;

// Re-export commonly used items at crate root
pub use crate::core::{
    ExchangeError, FrameError, ProxyConfig, ProxyConfigBuilder, ProxyError, SessionFault,
};
pub use crate::envelope::Envelope;
pub use crate::proxy::ProxyServer;
pub use crate::upstream::{SessionState, UpstreamSession};
