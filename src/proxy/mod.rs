//! The downstream side of the proxy.
//!
//! Listener, per-client serving tasks, and the fatal-shutdown policy that
//! turns a broken upstream session into process termination.

mod client;
mod server;

pub use server::*;
