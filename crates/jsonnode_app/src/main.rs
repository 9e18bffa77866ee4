//! `jsonnode` — exchange one greeting with a remote node.
//!
//! Binds the configured port, prints this host's public IPv4, prompts for
//! the remote host, sends `{"Hello": "There!"}` and prints the first message
//! that arrives.

mod logging;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jsonnode_net::{Address, AddressedMessage, JsonNode, NodeConfig};
use tracing::info;

/// Config file read from the working directory when present.
const CONFIG_FILE: &str = "jsonnode.json";

/// Directory for log files; console-only logging when unset.
const LOG_DIR_ENV: &str = "JSONNODE_LOG_DIR";

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => Some(logging::init_logging_to_dir(
            &PathBuf::from(dir),
            logging::DEFAULT_FILTER,
        )?),
        None => {
            logging::init_logging(logging::DEFAULT_FILTER)?;
            None
        }
    };

    let config = NodeConfig::load_or_default(Path::new(CONFIG_FILE));
    let node = JsonNode::bind(config.clone())
        .await
        .with_context(|| format!("Cannot start node on port {}", config.bind_port))?;

    match node.public_ipv4().await {
        Some(ip) => println!("Public IPv4: {ip}"),
        None => println!("Public IPv4: unavailable"),
    }

    let input = tokio::task::spawn_blocking(|| prompt("Remote IPv4: ")).await??;
    let remote = parse_remote(&input, config.bind_port)?;
    info!("Greeting {remote}");
    node.send(AddressedMessage::new(
        remote,
        serde_json::json!({"Hello": "There!"}),
    ));

    tokio::select! {
        received = node.receive() => match received {
            Some(msg) => println!("{} -> {}", msg.address(), msg.payload()),
            None => println!("Node stopped before a message arrived"),
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    node.close().await;
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    let mut stdout = std::io::stdout();
    stdout.write_all(label.as_bytes())?;
    stdout.flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Accept either `host:port` or a bare host, which gets `default_port`.
fn parse_remote(input: &str, default_port: u16) -> Result<Address> {
    let input = input.trim();
    anyhow::ensure!(!input.is_empty(), "No remote address given");

    if let Ok(addr) = input.parse::<Address>() {
        return Ok(addr);
    }
    let host = input.trim_start_matches('[').trim_end_matches(']');
    Ok(Address::new(host, default_port))
}
