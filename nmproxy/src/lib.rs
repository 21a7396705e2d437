//! nmproxy: native messaging bridge that relays frames over loopback HTTP.

mod version;

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod host;
pub mod logging;
pub mod relay;
pub mod signal;
pub mod transport;

pub use coordinator::{BridgeState, Coordinator, PeerIo};
pub use error::BridgeError;
pub use host::{CommandSpawner, HostSpawner};
pub use signal::{CancellationToken, ErrorSlot};
pub use version::{NMPROXY_VERSION, user_agent};
