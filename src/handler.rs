//! Registration handler
//!
//! Handles a freshly accepted connection: prompts for a username until one
//! is claimed, then hands the connection to the lobby dispatcher.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::AppError;
use crate::lobby::Registered;
use crate::message::{ServerMessage, END};
use crate::registry::RegistryHandle;

/// Handle a new TCP connection
///
/// Returns once the connection has been handed to the lobby, or closed
/// without claiming a username (`end`, end of stream, read error).
pub async fn handle_connection(
    stream: TcpStream,
    registry: RegistryHandle,
    lobby: mpsc::Sender<Registered>,
    config: Arc<ServerConfig>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut conn = Connection::spawn(stream, &config);
    info!("Connection {} from {}", conn.id, peer_addr);

    conn.send(ServerMessage::SelectUsername).await?;

    let username = loop {
        let Some(line) = conn.next_line().await else {
            debug!("{} closed before registering", conn.id);
            return Ok(());
        };

        if line == END {
            debug!("{} ended before registering", conn.id);
            return Ok(());
        }
        if line.is_empty() {
            continue;
        }

        match registry
            .register(line.clone(), conn.id, conn.outbound.clone())
            .await
        {
            Ok(()) => break line,
            Err(e @ AppError::UsernameInUse(_)) => conn.send(e.into()).await?,
            Err(e) => return Err(e),
        }
    };

    // Hand off ownership of the connection to the lobby stage
    if let Err(mpsc::error::SendError(registered)) = lobby
        .send(Registered {
            username,
            conn,
        })
        .await
    {
        registry
            .deregister(registered.username, registered.conn.id)
            .await;
        return Err(AppError::ChannelSend);
    }

    Ok(())
}
