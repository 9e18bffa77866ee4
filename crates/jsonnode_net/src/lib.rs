//! JsonNode — minimal peer-to-peer JSON messaging over TCP.
//!
//! Each node binds a listening port, decodes inbound frames into a queue,
//! and drains an outbound queue by opening one short-lived TCP connection
//! per message.
//!
//! # Architecture
//!
//! - **Codec**: a frame is a 4-byte big-endian length followed by UTF-8
//!   JSON text. Exactly one frame is sent per connection.
//! - **Transport**: an accept worker and a send worker, both tokio tasks,
//!   coordinated by a single shutdown flag.
//! - **Node**: owns the listener, both workers and both queues, and exposes
//!   `send` / `receive` / `close`.
//! - **Lookup**: on-demand public and local address discovery.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use jsonnode_net::{Address, AddressFamily, AddressedMessage, JsonNode};
//!
//! # async fn example() -> Result<(), jsonnode_net::NodeError> {
//! let node = JsonNode::new(6969, AddressFamily::Ipv4).await?;
//!
//! let peer: Address = "192.0.2.10:6969".parse().expect("valid address");
//! node.send(AddressedMessage::new(peer, serde_json::json!({"Hello": "There!"})));
//!
//! if let Some(reply) = node.receive().await {
//!     println!("{} says {}", reply.address(), reply.payload());
//! }
//! node.close().await;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod lookup;
pub mod message;
pub mod node;
mod transport;

// ── Re-exports for convenience ──────────────────────────────────────────

pub use config::NodeConfig;
pub use error::{CodecError, NodeError, SendError};
pub use message::{Address, AddressFamily, AddressParseError, AddressedMessage};
pub use node::JsonNode;
