//! Error types for the eppmux proxy.

use std::time::Duration;

use thiserror::Error;

/// Errors in the frame codec.
///
/// Framing errors are connection-local: the offending connection is closed,
/// other clients and the upstream session are unaffected.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The declared length cannot even cover the length header.
    #[error("declared frame length {declared} is shorter than the 4-byte header")]
    BadLength {
        /// The length value read off the wire.
        declared: u32,
    },

    /// The stream ended or failed before a complete frame arrived.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the upstream session became unusable.
///
/// A fault is terminal: the session never recovers in-process, and the
/// `Display` text is what synthesized error frames carry to clients.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionFault {
    /// No complete response arrived before the configured deadline.
    #[error("upstream exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered with a session-fatal result code.
    #[error("upstream reported session-fatal result code {0}")]
    ResultCode(u16),

    /// The upstream answered with an empty frame.
    #[error("upstream returned an empty response")]
    EmptyResponse,

    /// The upstream connection failed mid-exchange.
    #[error("upstream transport error: {0}")]
    Transport(String),
}

/// Errors returned by a single request/response exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// No complete response frame before the deadline. The session is
    /// marked broken before this is returned.
    #[error("exchange timed out after {0:?}")]
    Timeout(Duration),

    /// The connection failed mid-exchange. The session is marked broken
    /// before this is returned.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The session was already broken by an earlier fault; the request
    /// never reached the wire.
    #[error("session unavailable: {0}")]
    Unavailable(SessionFault),

    /// Login has not completed successfully.
    #[error("session is not ready")]
    NotReady,
}

/// Top-level proxy errors.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Framing error on the upstream connection during startup.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// The upstream rejected the login command.
    #[error("login rejected with code {code}: {message}")]
    LoginRejected {
        /// Result code from the login response.
        code: u16,
        /// Result message from the login response.
        message: String,
    },

    /// The shared upstream session broke while serving. The process is
    /// expected to terminate and be restarted by a supervisor.
    #[error("upstream session failure: {0}")]
    SessionFatal(#[from] SessionFault),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
