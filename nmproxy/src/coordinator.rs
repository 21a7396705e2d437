//! Coordinator - owns one bridge session from spawn to teardown.
//!
//! Flow:
//! 1. Starting: spawn the host, build the HTTP client, bind the ingress listener
//! 2. Running: ingress server, both relays, dispatcher and stderr copier run
//!    as independent tasks sharing one cancellation token and one error slot
//! 3. Draining: on the first error or external shutdown, cancel everything,
//!    kill the host, wait briefly for tasks, abort the rest
//! 4. Stopped: `Ok(())` for external shutdown, otherwise the first error
//!
//! A session is never restarted here; retry policy belongs to the caller.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::Instrument;
use url::Url;

use crate::bridge::protocol::{QUEUE_CAPACITY, Tag};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::BridgeError;
use crate::host::{CommandSpawner, HostProcess, HostSpawner, SpawnError, copy_stderr};
use crate::relay::{Relay, build_client};
use crate::signal::{CancellationToken, ErrorSlot};
use crate::transport::{IngressServer, IngressState};

/// How long Draining waits for tasks to observe cancellation before aborting them.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Starting,
    Running,
    Draining,
    Stopped,
}

/// This process's own standard streams, as seen by the bridge.
///
/// `input` carries frames from the browser, `output` carries frames back to
/// it, and the host's stderr is copied to `stderr`.
pub struct PeerIo<R, W, E> {
    pub input: R,
    pub output: W,
    pub stderr: E,
}

impl PeerIo<tokio::io::Stdin, tokio::io::Stdout, tokio::io::Stderr> {
    pub fn stdio() -> Self {
        Self {
            input: tokio::io::stdin(),
            output: tokio::io::stdout(),
            stderr: tokio::io::stderr(),
        }
    }
}

/// Everything acquired during Starting.
struct Started {
    host: HostProcess,
    host_stdin: ChildStdin,
    host_stdout: ChildStdout,
    host_stderr: ChildStderr,
    server: IngressServer,
    relay_to_host: Relay,
    relay_to_peer: Relay,
}

pub struct Coordinator {
    command: PathBuf,
    proxy: Option<Url>,
    spawner: Arc<dyn HostSpawner>,
    state_tx: watch::Sender<BridgeState>,
}

impl Coordinator {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Starting);
        Self {
            command: command.into(),
            proxy: None,
            spawner: Arc::new(CommandSpawner),
            state_tx,
        }
    }

    /// Coordinator for a loaded config. Fails if the command is unset or the
    /// proxy URL does not parse.
    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        let command = config.require_command()?;
        let proxy = config.proxy_url()?;
        Ok(Self::new(command).with_proxy(proxy))
    }

    pub fn with_proxy(mut self, proxy: Option<Url>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn HostSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: BridgeState) {
        tracing::debug!(?state, "Bridge state");
        self.state_tx.send_replace(state);
    }

    /// Run one bridge session until `shutdown` fires or a task fails.
    pub async fn run<R, W, E>(
        &self,
        peer: PeerIo<R, W, E>,
        shutdown: CancellationToken,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
        E: AsyncWrite + Unpin + Send + 'static,
    {
        self.set_state(BridgeState::Starting);

        let started = match self.start().await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, "Bridge failed to start");
                self.set_state(BridgeState::Stopped);
                return Err(e);
            }
        };
        let Started {
            mut host,
            host_stdin,
            host_stdout,
            host_stderr,
            server,
            relay_to_host,
            relay_to_peer,
        } = started;

        let cancel = shutdown.child_token();
        let (errors, mut first_error) = ErrorSlot::new();
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let addr = server.local_addr();

        let mut tasks = JoinSet::new();

        let ingress_state = IngressState::new(queue_tx, cancel.clone());
        let server_cancel = cancel.clone();
        let server_errors = errors.clone();
        tasks.spawn(
            async move {
                if let Err(e) = server.serve(ingress_state, server_cancel).await {
                    tracing::error!(error = %e, "Ingress server failed");
                    server_errors.publish(e);
                }
            }
            .instrument(tracing::info_span!("ingress", %addr)),
        );

        tasks.spawn(
            relay_to_host
                .run(peer.input, cancel.clone(), errors.clone())
                .instrument(tracing::info_span!("relay", tag = %Tag::ToHost)),
        );
        tasks.spawn(
            relay_to_peer
                .run(host_stdout, cancel.clone(), errors.clone())
                .instrument(tracing::info_span!("relay", tag = %Tag::ToPeer)),
        );
        tasks.spawn(
            Dispatcher::new(host_stdin, peer.output)
                .run(queue_rx, cancel.clone(), errors.clone())
                .instrument(tracing::info_span!("dispatcher")),
        );
        tasks.spawn(
            copy_stderr(host_stderr, peer.stderr, cancel.clone(), errors.clone())
                .instrument(tracing::info_span!("host_stderr")),
        );

        self.set_state(BridgeState::Running);
        tracing::info!(%addr, pid = ?host.id(), proxied = self.proxy.is_some(), "Bridge running");

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            Some(e) = first_error.recv() => Some(e),
        };

        self.set_state(BridgeState::Draining);
        match &outcome {
            None => tracing::info!("Shutdown requested, draining bridge"),
            Some(e) => tracing::error!(error = %e, "Bridge failed, draining"),
        }

        cancel.cancel();
        host.kill().await;
        drain(&mut tasks).await;

        self.set_state(BridgeState::Stopped);
        tracing::info!("Bridge stopped");

        match outcome {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    async fn start(&self) -> Result<Started, BridgeError> {
        tracing::debug!(command = %self.command.display(), "Launching native messaging host");
        let mut host = HostProcess::spawn(self.spawner.as_ref(), &self.command)?;
        let host_stdin = host
            .take_stdin()
            .ok_or(SpawnError::StreamNotCaptured("stdin"))?;
        let host_stdout = host
            .take_stdout()
            .ok_or(SpawnError::StreamNotCaptured("stdout"))?;
        let host_stderr = host
            .take_stderr()
            .ok_or(SpawnError::StreamNotCaptured("stderr"))?;

        tracing::debug!(proxy = ?self.proxy.as_ref().map(Url::as_str), "Preparing HTTP client");
        let client = build_client(self.proxy.as_ref())?;

        let server = IngressServer::bind().await?;
        let base = server.base_url()?;
        let relay_to_host = Relay::new(Tag::ToHost, client.clone(), &base)?;
        let relay_to_peer = Relay::new(Tag::ToPeer, client, &base)?;

        Ok(Started {
            host,
            host_stdin,
            host_stdout,
            host_stderr,
            server,
            relay_to_host,
            relay_to_peer,
        })
    }
}

/// Give tasks a moment to wind down on their own, then abort the stragglers.
async fn drain(tasks: &mut JoinSet<()>) {
    let joined = tokio::time::timeout(DRAIN_GRACE, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result
                && e.is_panic()
            {
                tracing::error!(error = %e, "Bridge task panicked");
            }
        }
    })
    .await;

    if joined.is_err() {
        tracing::warn!(remaining = tasks.len(), "Aborting bridge tasks that ignored cancellation");
        tasks.shutdown().await;
    }
}
