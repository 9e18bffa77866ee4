//! TCP transport — the accept worker and the send worker.
//!
//! Both workers are plain tokio tasks owned by a [`JsonNode`](crate::JsonNode).
//! The accept worker owns the listening socket and reads exactly one frame
//! from every connection it accepts, one connection at a time. The send
//! worker drains the outbound queue and opens a fresh connection for every
//! delivery attempt.
//!
//! Connections are processed sequentially on purpose. A peer that connects
//! and never writes stalls the inbound path until it disconnects or the node
//! closes, and an unreachable destination holds up every message queued
//! behind it.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::codec;
use crate::config::NodeConfig;
use crate::error::SendError;
use crate::message::{Address, AddressedMessage};

/// Read side of the node's shutdown flag.
///
/// The flag is set once by `close` and never reset. A dropped sender counts
/// as shutdown so that workers of a node dropped without `close` still exit.
#[derive(Debug, Clone)]
pub(crate) struct Shutdown(watch::Receiver<bool>);

impl Shutdown {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self(rx)
    }

    pub(crate) fn is_set(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolve once the flag is set.
    pub(crate) async fn wait(&mut self) {
        let _ = self.0.wait_for(|closed| *closed).await;
    }
}

/// Timings and limits shared by both workers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopSettings {
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub retry_interval: Duration,
    pub max_frame_len: usize,
}

impl From<&NodeConfig> for LoopSettings {
    fn from(config: &NodeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            connect_timeout: config.connect_timeout,
            retry_interval: config.retry_interval,
            max_frame_len: config.max_frame_len,
        }
    }
}

// ---------------------------------------------------------------------------
// Accept worker
// ---------------------------------------------------------------------------

/// Accept connections until shutdown, forwarding one decoded frame per
/// connection into `inbound`.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    inbound: mpsc::UnboundedSender<AddressedMessage>,
    mut shutdown: Shutdown,
    settings: LoopSettings,
) {
    let local = listener.local_addr().ok();
    info!("Accept worker started on {local:?}");

    while !shutdown.is_set() {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            result = tokio::time::timeout(settings.poll_interval, listener.accept()) => result,
        };

        let (stream, peer_addr) = match accepted {
            Err(_elapsed) => {
                trace!("No connection within {:?}", settings.poll_interval);
                continue;
            }
            Ok(Err(e)) => {
                warn!("TCP accept failed: {e}");
                continue;
            }
            Ok(Ok(conn)) => conn,
        };

        let message = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            message = read_connection(stream, peer_addr, settings.max_frame_len) => message,
        };

        if let Some(message) = message {
            if inbound.send(message).is_err() {
                debug!("Inbound queue dropped, stopping accept worker");
                break;
            }
        }
    }

    drop(listener);
    info!("Accept worker on {local:?} finished");
}

/// Read the single frame carried by an accepted connection.
async fn read_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    max_frame_len: usize,
) -> Option<AddressedMessage> {
    match codec::read_frame(&mut stream, max_frame_len).await {
        Ok(Some(payload)) => {
            debug!("Received frame from {peer_addr}");
            Some(AddressedMessage::new(Address::from(peer_addr), payload))
        }
        Ok(None) => {
            trace!("{peer_addr} closed before sending a complete frame");
            None
        }
        Err(e) => {
            warn!("Bad frame from {peer_addr}: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Send worker
// ---------------------------------------------------------------------------

/// Deliver queued messages in order until shutdown.
pub(crate) async fn send_loop(
    mut outbound: mpsc::UnboundedReceiver<AddressedMessage>,
    mut shutdown: Shutdown,
    settings: LoopSettings,
) {
    info!("Send worker started");

    while !shutdown.is_set() {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            next = tokio::time::timeout(settings.poll_interval, outbound.recv()) => next,
        };

        let message = match next {
            Err(_elapsed) => {
                trace!("Outbound queue idle");
                continue;
            }
            Ok(None) => {
                debug!("Outbound queue dropped, stopping send worker");
                break;
            }
            Ok(Some(message)) => message,
        };

        if !deliver(&message, &mut shutdown, settings).await {
            info!(
                "Shutdown while delivering to {}, message abandoned",
                message.address()
            );
            break;
        }
    }

    info!("Send worker finished");
}

/// Retry delivery of `message` until it succeeds or shutdown is signalled.
///
/// Returns `false` if shutdown interrupted delivery.
async fn deliver(message: &AddressedMessage, shutdown: &mut Shutdown, settings: LoopSettings) -> bool {
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            biased;
            _ = shutdown.wait() => return false,
            result = send_once(message, settings.connect_timeout) => result,
        };

        match result {
            Ok(()) => {
                debug!("Delivered frame to {} (attempt {attempt})", message.address());
                return true;
            }
            Err(e) => warn!("Send error (attempt {attempt}): {e}"),
        }

        tokio::select! {
            biased;
            _ = shutdown.wait() => return false,
            _ = tokio::time::sleep(settings.retry_interval) => {}
        }
    }
}

/// One delivery attempt over a fresh connection.
pub(crate) async fn send_once(
    message: &AddressedMessage,
    connect_timeout: Duration,
) -> Result<(), SendError> {
    let addr = message.address();
    let connect = TcpStream::connect((addr.host(), addr.port()));
    let mut stream = tokio::time::timeout(connect_timeout, connect)
        .await
        .map_err(|_| SendError::Timeout {
            addr: addr.to_string(),
            timeout: connect_timeout,
        })?
        .map_err(|source| SendError::Connect {
            addr: addr.to_string(),
            source,
        })?;

    codec::write_frame(&mut stream, message.payload())
        .await
        .map_err(|source| SendError::Write {
            addr: addr.to_string(),
            source,
        })?;

    // The peer reads exactly one frame, so a failed half-close is harmless.
    if let Err(e) = stream.shutdown().await {
        trace!("Shutdown of connection to {addr} failed: {e}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
