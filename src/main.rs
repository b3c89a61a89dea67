//! Multi-room chat server - Entry Point
//!
//! `roomchat server [addr]` runs the server, `roomchat client [addr]`
//! (or any other first argument) runs the terminal client.

use std::env;

use tracing::info;
use tracing_subscriber::EnvFilter;

use roomchat::server::shutdown_signal;
use roomchat::{run_client, Mode, Server, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=roomchat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomchat=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Mode::from_args(env::args().skip(1)) {
        Mode::Server { addr } => {
            let server = Server::bind(ServerConfig::with_addr(addr)).await?;
            info!("Chat server listening on {}", server.local_addr()?);

            server
                .run_until(shutdown_signal(tokio::signal::ctrl_c()))
                .await;
        }
        Mode::Client { addr } => {
            run_client(&addr).await?;
        }
    }

    Ok(())
}
