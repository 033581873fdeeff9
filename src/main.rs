use std::sync::Arc;

use mcp_wolfram_alpha::bridge::WolframBridge;
use mcp_wolfram_alpha::config::ServerConfig;
use mcp_wolfram_alpha::logging;
use mcp_wolfram_alpha::server::McpServer;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    logging::init();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("mcp-wolfram-alpha: configuration error: {e}");
            std::process::exit(1);
        }
    };

    let bridge = match WolframBridge::from_config(&config) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            eprintln!("mcp-wolfram-alpha: cannot create HTTP client: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        rate_per_sec = config.rate_limit.refill_per_sec,
        max_retries = config.retry.max_retries,
        "starting"
    );

    let mut server = McpServer::new(bridge);
    if let Some(grace) = config.drain_grace {
        server = server.with_drain_grace(grace);
    }
    if let Err(e) = server.run().await {
        eprintln!("mcp-wolfram-alpha: fatal error: {e}");
        std::process::exit(1);
    }
}
