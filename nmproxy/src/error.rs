//! Bridge session errors.
//!
//! Each variant names the subsystem that failed so the final diagnostic
//! identifies both where and why.

use std::io;
use std::net::SocketAddr;

use crate::bridge::codec::FrameError;
use crate::bridge::protocol::Tag;
use crate::config::ConfigError;
use crate::host::SpawnError;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("host launcher: {0}")]
    Spawn(#[from] SpawnError),

    #[error("http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("ingress server: failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("ingress server: invalid address: {0}")]
    Address(#[from] url::ParseError),

    #[error("ingress server: {0}")]
    Serve(#[source] io::Error),

    #[error("{tag} relay: {source}")]
    Frame {
        tag: Tag,
        #[source]
        source: FrameError,
    },

    #[error("{tag} relay: POST failed: {source}")]
    Transport {
        tag: Tag,
        #[source]
        source: reqwest::Error,
    },

    #[error("dispatcher: failed to deliver {tag} frame: {source}")]
    Deliver {
        tag: Tag,
        #[source]
        source: FrameError,
    },

    #[error("host stderr: {0}")]
    HostStderr(#[source] io::Error),
}

impl BridgeError {
    /// True for startup faults: nothing ran, nothing needs draining.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Spawn(_)
                | Self::Client(_)
                | Self::Bind { .. }
                | Self::Address(_)
        )
    }
}
