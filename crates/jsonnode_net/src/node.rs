//! JsonNode — a listening socket, two workers and two queues.
//!
//! [`JsonNode`] is the primary public API for jsonnode_net:
//! - [`bind`](JsonNode::bind) binds the listener and starts both workers
//! - [`send`](JsonNode::send) queues a message for fire-and-forget delivery
//! - [`receive`](JsonNode::receive) waits for the next inbound message
//! - [`close`](JsonNode::close) stops both workers and waits for them

use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::lookup;
use crate::message::{Address, AddressFamily, AddressedMessage};
use crate::transport::{self, LoopSettings, Shutdown};

/// A peer-to-peer messaging node.
///
/// Every message travels over its own short-lived TCP connection as a single
/// length-prefixed JSON frame. Dropping a node without calling
/// [`close`](JsonNode::close) also stops the workers, but does not wait for
/// them.
pub struct JsonNode {
    /// Network configuration.
    config: NodeConfig,
    /// Address the listener actually bound to.
    local_addr: SocketAddr,
    /// Messages decoded by the accept worker.
    inbound: Mutex<mpsc::UnboundedReceiver<AddressedMessage>>,
    /// Messages waiting for the send worker.
    outbound: mpsc::UnboundedSender<AddressedMessage>,
    /// Shutdown flag shared by both workers.
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    send_task: JoinHandle<()>,
}

impl JsonNode {
    /// Bind the listener described by `config` and start both workers.
    pub async fn bind(config: NodeConfig) -> Result<Self, NodeError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;
        info!("JsonNode listening on {local_addr}");

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let settings = LoopSettings::from(&config);

        let accept_task = tokio::spawn(transport::accept_loop(
            listener,
            inbound_tx,
            Shutdown::new(shutdown_rx.clone()),
            settings,
        ));
        let send_task = tokio::spawn(transport::send_loop(
            outbound_rx,
            Shutdown::new(shutdown_rx),
            settings,
        ));

        Ok(Self {
            config,
            local_addr,
            inbound: Mutex::new(inbound_rx),
            outbound: outbound_tx,
            shutdown_tx,
            accept_task,
            send_task,
        })
    }

    /// Bind on the wildcard address of `family` with default timings.
    pub async fn new(bind_port: u16, family: AddressFamily) -> Result<Self, NodeError> {
        Self::bind(NodeConfig::new(bind_port, family)).await
    }

    /// Return the node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The bound listening address. Reports the real port when the node
    /// was configured with port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next inbound message.
    ///
    /// Messages are returned in the order their connections were read.
    /// Returns `None` only once the accept worker has stopped and every
    /// queued message has been handed out.
    pub async fn receive(&self) -> Option<AddressedMessage> {
        self.inbound.lock().await.recv().await
    }

    /// Take the next inbound message if one is already queued.
    ///
    /// Returns `None` while another task is waiting in
    /// [`receive`](JsonNode::receive), even if messages are queued, since that
    /// task holds the inbound queue until it is handed a message.
    pub fn try_receive(&self) -> Option<AddressedMessage> {
        self.inbound.try_lock().ok()?.try_recv().ok()
    }

    /// Queue `message` for delivery and return immediately.
    ///
    /// Delivery outcome is not reported. An unreachable destination is
    /// retried until it accepts or the node closes, holding up every message
    /// queued after it.
    pub fn send(&self, message: AddressedMessage) {
        if let Err(e) = self.outbound.send(message) {
            warn!("Send worker gone, dropping message for {}", e.0.address());
        }
    }

    /// Signal shutdown and wait for both workers to finish.
    ///
    /// The listening socket is released before this returns. A message whose
    /// delivery is still being retried is abandoned.
    pub async fn close(self) {
        self.shutdown_tx.send_replace(true);

        for (name, task) in [("accept", self.accept_task), ("send", self.send_task)] {
            if let Err(e) = task.await {
                error!("{name} worker ended abnormally: {e}");
            }
        }
        info!("JsonNode on {} closed", self.local_addr);
    }

    // -----------------------------------------------------------------------
    // Address accessors
    // -----------------------------------------------------------------------

    /// This host's public IP as seen by an external lookup service.
    pub async fn public_ip(&self, family: AddressFamily) -> Option<IpAddr> {
        lookup::public_ip(family).await
    }

    /// This host's address on the local network.
    pub async fn local_ip(&self, family: AddressFamily) -> Option<IpAddr> {
        lookup::local_ip(family).await
    }

    /// Public IP paired with the bound port, i.e. where remote peers should
    /// send to.
    pub async fn public_address(&self, family: AddressFamily) -> Option<Address> {
        let ip = self.public_ip(family).await?;
        Some(Address::new(ip.to_string(), self.local_addr.port()))
    }

    pub async fn public_ipv4(&self) -> Option<IpAddr> {
        self.public_ip(AddressFamily::Ipv4).await
    }

    pub async fn public_ipv6(&self) -> Option<IpAddr> {
        self.public_ip(AddressFamily::Ipv6).await
    }

    pub async fn local_ipv4(&self) -> Option<IpAddr> {
        self.local_ip(AddressFamily::Ipv4).await
    }

    pub async fn local_ipv6(&self) -> Option<IpAddr> {
        self.local_ip(AddressFamily::Ipv6).await
    }

    pub async fn host_ipv4(&self) -> Option<Address> {
        self.public_address(AddressFamily::Ipv4).await
    }

    pub async fn host_ipv6(&self) -> Option<Address> {
        self.public_address(AddressFamily::Ipv6).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
