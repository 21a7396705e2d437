//! Outbound relay: frames from a byte stream → HTTP POSTs to the ingress server.
//!
//! One relay per direction. Each POST completes before the next frame is
//! read, which is what keeps per-direction ordering end to end.

use std::io;

use futures::StreamExt;
use reqwest::header::CONTENT_TYPE;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use url::Url;

use crate::bridge::codec::{FrameCodec, FrameError};
use crate::bridge::protocol::{FRAME_CONTENT_TYPE, Tag};
use crate::error::BridgeError;
use crate::signal::{CancellationToken, ErrorSlot};
use crate::version::user_agent;

/// Build the HTTP client used by both relays.
///
/// With a proxy URL every request is routed through it (`http://`,
/// `https://`, `socks5://`, `socks5h://`). Without one, environment proxy
/// settings are ignored so POSTs go straight to the loopback listener.
pub fn build_client(proxy: Option<&Url>) -> Result<reqwest::Client, BridgeError> {
    let builder = reqwest::Client::builder().user_agent(user_agent());

    let builder = match proxy {
        Some(url) => {
            let proxy = reqwest::Proxy::all(url.clone()).map_err(BridgeError::Client)?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder.build().map_err(BridgeError::Client)
}

pub struct Relay {
    tag: Tag,
    client: reqwest::Client,
    target: Url,
}

impl Relay {
    /// Relay posting to `tag`'s path on the ingress server at `base`.
    pub fn new(tag: Tag, client: reqwest::Client, base: &Url) -> Result<Self, url::ParseError> {
        let target = base.join(tag.path())?;
        Ok(Self {
            tag,
            client,
            target,
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Pump until cancelled or a fatal error, which is published to `errors`.
    pub async fn run<R>(self, source: R, cancel: CancellationToken, errors: ErrorSlot)
    where
        R: AsyncRead + Unpin,
    {
        match self.pump(source, &cancel).await {
            Ok(()) => tracing::debug!(tag = %self.tag, "Relay cancelled"),
            Err(e) => {
                tracing::error!(tag = %self.tag, error = %e, "Relay failed");
                errors.publish(e);
            }
        }
    }

    async fn pump<R>(&self, source: R, cancel: &CancellationToken) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin,
    {
        let mut frames = FramedRead::new(source, FrameCodec::new());

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                next = frames.next() => next,
            };

            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(source)) => {
                    return Err(BridgeError::Frame {
                        tag: self.tag,
                        source,
                    });
                }
                None => {
                    return Err(BridgeError::Frame {
                        tag: self.tag,
                        source: FrameError::Io(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "stream closed",
                        )),
                    });
                }
            };

            let len = payload.len();
            tracing::trace!(tag = %self.tag, len, "Read frame");

            let request = self
                .client
                .post(self.target.clone())
                .header(CONTENT_TYPE, FRAME_CONTENT_TYPE)
                .body(payload)
                .send();

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(()),
                response = request => response,
            };

            match response {
                Ok(resp) if resp.status().is_success() => {
                    tracing::debug!(tag = %self.tag, len, "Relayed frame");
                }
                Ok(resp) => {
                    tracing::warn!(tag = %self.tag, len, status = %resp.status(), "Ingress did not accept frame");
                }
                Err(source) => {
                    return Err(BridgeError::Transport {
                        tag: self.tag,
                        source,
                    });
                }
            }
        }
    }
}
