//! Wire transport for the proxy.
//!
//! Two concerns live here:
//!
//! - **Frame codec**: the 4-byte big-endian length-prefixed framing used on
//!   both the client-facing and upstream sockets ([`encode`], [`read_frame`],
//!   [`write_frame`]).
//! - **Upstream stream**: the TCP (optionally TLS) connection to the remote
//!   EPP server ([`UpstreamStream`]).
//!
//! The codec is pure byte counting; everything that understands XML lives in
//! [`crate::envelope`].

mod frame;
mod stream;

pub use frame::*;
pub use stream::*;
