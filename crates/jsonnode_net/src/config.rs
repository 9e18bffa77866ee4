//! Node configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NodeError;
use crate::message::AddressFamily;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 6969;

/// Configuration for a [`JsonNode`](crate::JsonNode).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Port to listen on. `0` picks an ephemeral port.
    pub bind_port: u16,

    /// IP family of the listening socket.
    pub family: AddressFamily,

    /// Bounded wait used by both workers between checks of the shutdown flag.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,

    /// Upper bound on a single outbound connect attempt.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,

    /// Pause between failed delivery attempts of the same message.
    #[serde(with = "duration_ms")]
    pub retry_interval: Duration,

    /// Largest inbound payload accepted, in bytes.
    pub max_frame_len: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_port: DEFAULT_PORT,
            family: AddressFamily::Ipv4,
            poll_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(250),
            max_frame_len: 16 * 1024 * 1024,
        }
    }
}

impl NodeConfig {
    /// Default config listening on `bind_port` with the given family.
    pub fn new(bind_port: u16, family: AddressFamily) -> Self {
        Self {
            bind_port,
            family,
            ..Self::default()
        }
    }

    /// Wildcard address the node binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.family.wildcard(), self.bind_port)
    }

    /// Save the config to a JSON file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), NodeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load_from_file(path: &Path) -> Result<Self, NodeError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("Cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&data)
            .map_err(|e| NodeError::Config(format!("Corrupt config {}: {e}", path.display())))
    }

    /// Load config from a JSON file, or return defaults if the file is
    /// missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{e}, using defaults");
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(dur: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(dur.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
