//! Public and local address lookup.
//!
//! These helpers are only called on demand from the node's accessors. A
//! lookup failure of any kind is logged and reported as `None`.

use std::net::IpAddr;
use std::time::Duration;

use tracing::debug;

use crate::message::AddressFamily;

/// Lookup service answering with the caller's public IPv4 as plain text.
pub const IPV4_LOOKUP_URL: &str = "https://api4.ipify.org";

/// Lookup service answering with the caller's public IPv6 as plain text.
pub const IPV6_LOOKUP_URL: &str = "https://api6.ipify.org";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// The lookup service used for `family`.
pub fn lookup_url(family: AddressFamily) -> &'static str {
    match family {
        AddressFamily::Ipv4 => IPV4_LOOKUP_URL,
        AddressFamily::Ipv6 => IPV6_LOOKUP_URL,
    }
}

/// This host's externally visible address of the given family.
pub async fn public_ip(family: AddressFamily) -> Option<IpAddr> {
    public_ip_from(lookup_url(family))
        .await
        .filter(|ip| family.matches(ip))
}

/// Ask `url` for this host's address. The response body must be a bare IP.
pub async fn public_ip_from(url: &str) -> Option<IpAddr> {
    let client = match reqwest::Client::builder().timeout(LOOKUP_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            debug!("Cannot build HTTP client: {e}");
            return None;
        }
    };

    let body = match client.get(url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response.text().await,
        Err(e) => {
            debug!("Public address lookup via {url} failed: {e}");
            return None;
        }
    };

    match body {
        Ok(text) => match text.trim().parse() {
            Ok(ip) => Some(ip),
            Err(e) => {
                debug!("Lookup service {url} returned {text:?}: {e}");
                None
            }
        },
        Err(e) => {
            debug!("Reading lookup response from {url} failed: {e}");
            None
        }
    }
}

/// This host's address on the local network, resolved from its hostname.
pub async fn local_ip(family: AddressFamily) -> Option<IpAddr> {
    match whoami::fallible::hostname() {
        Ok(host) => local_ip_for(&host, family).await,
        Err(e) => {
            debug!("Cannot determine hostname: {e}");
            None
        }
    }
}

/// Resolve `host` and return its first address of the given family.
pub async fn local_ip_for(host: &str, family: AddressFamily) -> Option<IpAddr> {
    match tokio::net::lookup_host((host, 0)).await {
        Ok(addrs) => addrs.map(|addr| addr.ip()).find(|ip| family.matches(ip)),
        Err(e) => {
            debug!("Resolving {host} failed: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response and return the URL to fetch it.
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        });
        format!("http://{addr}/")
    }

    #[test]
    fn test_lookup_urls() {
        assert_eq!(lookup_url(AddressFamily::Ipv4), "https://api4.ipify.org");
        assert_eq!(lookup_url(AddressFamily::Ipv6), "https://api6.ipify.org");
    }

    #[tokio::test]
    async fn test_public_ip_parses_body() {
        let url = serve_once("200 OK", "203.0.113.7\n").await;
        assert_eq!(public_ip_from(&url).await, Some("203.0.113.7".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_public_ip_rejects_non_ip_body() {
        let url = serve_once("200 OK", "<html>rate limited</html>").await;
        assert_eq!(public_ip_from(&url).await, None);
    }

    #[tokio::test]
    async fn test_public_ip_http_error() {
        let url = serve_once("503 Service Unavailable", "1.2.3.4").await;
        assert_eq!(public_ip_from(&url).await, None);
    }

    #[tokio::test]
    async fn test_public_ip_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        assert_eq!(public_ip_from(&format!("http://{addr}/")).await, None);
    }

    #[tokio::test]
    async fn test_local_ip_for_literal() {
        assert_eq!(
            local_ip_for("127.0.0.1", AddressFamily::Ipv4).await,
            Some("127.0.0.1".parse().unwrap())
        );
        assert_eq!(local_ip_for("127.0.0.1", AddressFamily::Ipv6).await, None);
    }

    #[tokio::test]
    async fn test_local_ip_for_unresolvable() {
        assert_eq!(local_ip_for("no-such-host.invalid", AddressFamily::Ipv4).await, None);
    }
}
