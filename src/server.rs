//! Server bootstrap
//!
//! Binds the listener, starts the registry actor (which opens the default
//! room) and the lobby dispatcher, then accepts connections.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::lobby::{LobbyDispatcher, Registered};
use crate::message::ServerMessage;
use crate::registry::RegistryHandle;

/// Time given to writer tasks to flush the shutdown notice
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

pub struct Server {
    listener: TcpListener,
    registry: RegistryHandle,
    lobby: mpsc::Sender<Registered>,
    config: Arc<ServerConfig>,
}

impl Server {
    /// Bind the listener and start the long-lived actors
    ///
    /// A bind failure is the one fatal startup error.
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.addr).await?;
        let config = Arc::new(config);

        let registry = RegistryHandle::spawn(config.clone());

        let (lobby, lobby_rx) = mpsc::channel(config.queue_capacity);
        let dispatcher = LobbyDispatcher::new(lobby_rx, registry.clone(), config.clone());
        tokio::spawn(dispatcher.run());

        Ok(Self {
            listener,
            registry,
            lobby,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Connection accept loop; runs for the life of the process
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let registry = self.registry.clone();
                    let lobby = self.lobby.clone();
                    let config = self.config.clone();

                    // Spawn registration task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry, lobby, config).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Accept connections until `shutdown` completes, then tell every
    /// registered user the server is going away
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let registry = self.registry.clone();

        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!("Shutting down");
                registry.announce(ServerMessage::ShuttingDown).await;
                // Round trip so the announcement has been queued everywhere
                let _ = registry.stats().await;
                tokio::time::sleep(SHUTDOWN_GRACE).await;
            }
        }
    }
}

/// Resolve when `signal` fires
///
/// If the signal handler cannot be installed the server keeps running
/// instead of shutting down right away.
pub async fn shutdown_signal<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_fires() {
        let fired = tokio::time::timeout(
            Duration::from_secs(2),
            shutdown_signal(async { Ok(()) }),
        )
        .await;
        assert!(fired.is_ok());
    }

    #[tokio::test]
    async fn test_failed_signal_never_shuts_down() {
        let fired = tokio::time::timeout(
            Duration::from_millis(200),
            shutdown_signal(async { Err(std::io::Error::other("no signal handler")) }),
        )
        .await;
        assert!(fired.is_err());
    }
}
