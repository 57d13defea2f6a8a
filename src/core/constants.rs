//! Protocol constants for the EPP envelope and proxy defaults.
//!
//! The result codes are fixed by RFC 5730 and MUST NOT be changed.

use std::time::Duration;

// =============================================================================
// EPP NAMESPACE
// =============================================================================

/// Base namespace of the EPP envelope (RFC 5730).
pub const EPP_NS: &str = "urn:ietf:params:xml:ns:epp-1.0";

/// EPP protocol version declared at login.
pub const EPP_VERSION: &str = "1.0";

/// Language declared at login.
pub const EPP_LANG: &str = "en";

// =============================================================================
// RESULT CODES (RFC 5730 §3)
// =============================================================================

/// Command completed successfully.
pub const RESULT_SUCCESS: u16 = 1000;

/// Command failed. Also the sentinel for an uninterpretable response.
pub const RESULT_COMMAND_FAILED: u16 = 2400;

/// Command failed; server closing connection.
pub const RESULT_SESSION_ERROR: u16 = 2500;

/// Authentication error; server closing connection.
pub const RESULT_AUTH_ERROR: u16 = 2501;

/// Session limit exceeded; server closing connection.
pub const RESULT_SESSION_LIMIT: u16 = 2502;

// =============================================================================
// FRAMING (RFC 5734 §4)
// =============================================================================

/// Size of the big-endian length header. The declared length counts it.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Smallest legal declared length (a frame with an empty payload).
pub const MIN_FRAME_LEN: u32 = FRAME_HEADER_SIZE as u32;

// =============================================================================
// TIMING
// =============================================================================

/// Exchange timeout applied when the configuration leaves it unset or
/// non-positive.
pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// DEFAULTS
// =============================================================================

/// IANA-assigned port for EPP over TLS (RFC 5734).
pub const DEFAULT_EPP_PORT: u16 = 700;

/// Default downstream listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7700";
