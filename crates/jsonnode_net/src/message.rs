//! Addresses and addressed messages.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// IP family the listening socket is bound with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressFamily {
    #[default]
    Ipv4,
    Ipv6,
}

impl AddressFamily {
    /// The wildcard address for this family (`0.0.0.0` or `::`).
    pub fn wildcard(self) -> IpAddr {
        match self {
            Self::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Self::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Whether `ip` belongs to this family.
    pub fn matches(self, ip: &IpAddr) -> bool {
        matches!(
            (self, ip),
            (Self::Ipv4, IpAddr::V4(_)) | (Self::Ipv6, IpAddr::V6(_))
        )
    }
}

/// A (host, port) pair identifying a network endpoint.
///
/// The host is kept as a string so that hostnames as well as IP literals can
/// be used as send destinations. Inbound messages carry the peer's observed
/// socket address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The host parsed as an IP literal, if it is one.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Error returned when a string is not a valid `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid address '{0}', expected host:port")]
pub struct AddressParseError(String);

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressParseError(s.to_string());

        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
            (host, port)
        } else {
            let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
            if host.contains(':') {
                // Bare IPv6 literals need brackets to carry a port.
                return Err(invalid());
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

/// A JSON payload paired with the address it came from or is going to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedMessage {
    address: Address,
    payload: serde_json::Value,
}

impl AddressedMessage {
    pub fn new(address: Address, payload: serde_json::Value) -> Self {
        Self { address, payload }
    }

    /// Build a message from any serializable payload.
    pub fn json<T: Serialize>(address: Address, payload: &T) -> Result<Self, NodeError> {
        Ok(Self::new(address, serde_json::to_value(payload)?))
    }

    /// Destination for outbound messages, sender for inbound ones.
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Deserialize the payload into a concrete type.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, NodeError> {
        Ok(T::deserialize(&self.payload)?)
    }

    pub fn into_parts(self) -> (Address, serde_json::Value) {
        (self.address, self.payload)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_display() {
        assert_eq!(Address::new("127.0.0.1", 6969).to_string(), "127.0.0.1:6969");
        assert_eq!(Address::new("::1", 6969).to_string(), "[::1]:6969");
        assert_eq!(Address::new("example.org", 80).to_string(), "example.org:80");
    }

    #[test]
    fn test_address_parse() {
        let addr: Address = "10.0.0.7:6969".parse().unwrap();
        assert_eq!(addr.host(), "10.0.0.7");
        assert_eq!(addr.port(), 6969);

        let v6: Address = "[fe80::1]:4000".parse().unwrap();
        assert_eq!(v6.host(), "fe80::1");
        assert_eq!(v6.port(), 4000);
        assert_eq!(v6.to_string(), "[fe80::1]:4000");

        let named: Address = "peer.local:1".parse().unwrap();
        assert_eq!(named.host(), "peer.local");
        assert!(named.ip().is_none());
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        for bad in ["", "nohost", ":80", "host:", "host:99999", "::1:80", "[::1]80"] {
            assert!(bad.parse::<Address>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_address_from_socket_addr() {
        let sock: SocketAddr = "[::1]:9000".parse().unwrap();
        let addr = Address::from(sock);
        assert_eq!(addr.ip(), Some(sock.ip()));
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_family_wildcard() {
        assert_eq!(AddressFamily::Ipv4.wildcard().to_string(), "0.0.0.0");
        assert_eq!(AddressFamily::Ipv6.wildcard().to_string(), "::");
        assert!(AddressFamily::Ipv4.matches(&"1.2.3.4".parse().unwrap()));
        assert!(!AddressFamily::Ipv4.matches(&"::1".parse().unwrap()));
    }

    #[test]
    fn test_message_typed_payload() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Greeting {
            text: String,
            count: u32,
        }

        let greeting = Greeting {
            text: "hi".to_string(),
            count: 2,
        };
        let msg = AddressedMessage::json(Address::new("127.0.0.1", 1), &greeting).unwrap();
        assert_eq!(msg.payload(), &serde_json::json!({"text": "hi", "count": 2}));

        let back: Greeting = msg.payload_as().unwrap();
        assert_eq!(back, greeting);

        let wrong: Result<Vec<u8>, _> = msg.payload_as();
        assert!(matches!(wrong, Err(NodeError::Serialization(_))));
    }

    #[test]
    fn test_message_into_parts() {
        let msg = AddressedMessage::new(Address::new("h", 2), serde_json::json!([1, 2, 3]));
        let (addr, payload) = msg.into_parts();
        assert_eq!(addr, Address::new("h", 2));
        assert_eq!(payload, serde_json::json!([1, 2, 3]));
    }
}
