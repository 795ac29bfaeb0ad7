//! Detection relay server
//!
//! Run with: cargo run --example relay_server [BIND_ADDR] [REDIS_URL]
//!
//! Examples:
//!   cargo run --example relay_server                                  # 0.0.0.0:8080, redis://127.0.0.1:6379
//!   cargo run --example relay_server localhost:9000                   # 127.0.0.1:9000
//!   cargo run --example relay_server 0.0.0.0:8080 redis://cache:6379  # remote store
//!
//! ## Publishing a detection
//!
//!   redis-cli HSET image_metadata:1757493783675 timestamp 1757493783675 \
//!       center_x 10.0 center_y 20.0 width 400.0 height 300.0 confidence 87.5
//!   redis-cli PUBLISH image:metadata:updates image_metadata:1757493783675
//!
//! ## Subscribing
//!
//!   curl -N http://localhost:8080/api/image-metadata/stream

use std::net::SocketAddr;

use detection_relay::config::DEFAULT_REDIS_URL;
use detection_relay::server::config::DEFAULT_PORT;
use detection_relay::{RelayConfig, ServerConfig};

/// Parse bind address from command line argument
///
/// Accepts "localhost", "localhost:9000", "127.0.0.1", "0.0.0.0:8080".
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: relay_server [BIND_ADDR] [REDIS_URL]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:{})", DEFAULT_PORT);
    eprintln!("  REDIS_URL    Store URL (default: {})", DEFAULT_REDIS_URL);
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG, e.g. RUST_LOG=detection_relay=trace");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut server = ServerConfig::default();
    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => server = server.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("detection_relay=debug".parse()?)
                .add_directive("relay_server=debug".parse()?),
        )
        .init();

    let mut config = RelayConfig::default().server(server);
    if let Some(url) = args.get(2) {
        config = config.redis_url(url.clone());
    }

    tracing::info!(
        bind = %config.server.bind_addr,
        redis = %config.redis_url,
        channel = %config.channel,
        "Starting detection relay"
    );

    detection_relay::relay::run_until(config, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;

    Ok(())
}
