//! Loopback ingress server.

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tracing::info;
use url::Url;

use crate::error::BridgeError;
use crate::signal::CancellationToken;

use super::routes::{IngressState, routes};

/// Ingress listener bound to an ephemeral loopback port.
///
/// Binding and serving are separate steps so the coordinator knows the
/// address (and can fail startup) before any task runs.
pub struct IngressServer {
    listener: TcpListener,
    addr: SocketAddr,
}

impl IngressServer {
    pub async fn bind() -> Result<Self, BridgeError> {
        let requested = SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
        let listener = TcpListener::bind(requested)
            .await
            .map_err(|source| BridgeError::Bind {
                addr: requested,
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| BridgeError::Bind {
            addr: requested,
            source,
        })?;

        tracing::debug!(%addr, "Bound ingress listener");
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL the relays post to.
    pub fn base_url(&self) -> Result<Url, BridgeError> {
        Ok(Url::parse(&format!("http://{}/", self.addr))?)
    }

    /// Serve until `cancel` fires.
    ///
    /// In-flight handlers observe the same token and answer `500` instead of
    /// waiting for queue space, so shutdown does not hang on them.
    pub async fn serve(
        self,
        state: IngressState,
        cancel: CancellationToken,
    ) -> Result<(), BridgeError> {
        info!(addr = %self.addr, "Starting ingress server");

        axum::serve(self.listener, routes(state))
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .map_err(BridgeError::Serve)?;

        info!("Ingress server closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{QueuedMessage, Tag};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn binds_loopback_ephemeral_port() {
        let server = IngressServer::bind().await.unwrap();
        let addr = server.local_addr();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
        assert_eq!(
            server.base_url().unwrap().as_str(),
            format!("http://127.0.0.1:{}/", addr.port())
        );
    }

    #[tokio::test]
    async fn serves_frames_until_cancelled() {
        let server = IngressServer::bind().await.unwrap();
        let base = server.base_url().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let state = IngressState::new(tx, cancel.clone());
        let task = tokio::spawn(server.serve(state, cancel.clone()));

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let response = client
            .post(base.join("to-peer").unwrap())
            .header("content-type", "application/json")
            .body("{\"ok\":true}")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            rx.recv().await.unwrap(),
            QueuedMessage::new(Tag::ToPeer, &b"{\"ok\":true}"[..])
        );

        cancel.cancel();
        task.await.unwrap().unwrap();

        // Listener is gone once serve returns.
        let after = client.post(base.join("to-peer").unwrap()).send().await;
        assert!(after.is_err());
    }
}
