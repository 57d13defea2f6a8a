//! The upstream side of the proxy.
//!
//! Session establishment (connect, greeting capture, login) and the
//! serialized exchange path over the single connection to the remote EPP
//! server.

mod login;
mod session;

pub use login::*;
pub use session::*;
