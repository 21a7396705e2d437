//! HTTP ingress: receives relayed frame payloads and queues them for the dispatcher.

pub mod routes;
pub mod server;

pub use routes::{IngressState, routes};
pub use server::IngressServer;
