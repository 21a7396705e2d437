//! Transport layer for nmproxy.
//!
//! The only transport is the loopback HTTP ingress the relays post to.

pub mod http;

pub use http::{IngressServer, IngressState};
