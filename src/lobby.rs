//! Lobby: pre-room command interpreter
//!
//! The `LobbyDispatcher` receives freshly registered users in FIFO order and
//! starts one `LobbyWorker` for each. A worker reads `list`, `join`,
//! `create` and `end` commands until the user enters a room, disconnects or
//! ends the session.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{LobbyCommand, ServerMessage};
use crate::registry::{CreateOutcome, RegistryHandle};
use crate::room::{JoinOutcome, JoinRequest};
use crate::types::RoomName;

/// A user that just claimed a username
#[derive(Debug)]
pub struct Registered {
    pub username: String,
    pub conn: Connection,
}

/// Starts a lobby worker for every registered user
pub struct LobbyDispatcher {
    receiver: mpsc::Receiver<Registered>,
    registry: RegistryHandle,
    config: Arc<ServerConfig>,
}

impl LobbyDispatcher {
    pub fn new(
        receiver: mpsc::Receiver<Registered>,
        registry: RegistryHandle,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            receiver,
            registry,
            config,
        }
    }

    pub async fn run(mut self) {
        while let Some(Registered { username, conn }) = self.receiver.recv().await {
            let worker = LobbyWorker::new(
                username,
                conn,
                self.registry.clone(),
                self.config.clone(),
            );
            tokio::spawn(worker.run());
        }

        debug!("Lobby dispatcher stopped");
    }
}

/// What happened to the connection after a room command
enum Step {
    /// A room admitted the user and now owns the connection
    Entered,
    /// Still in the lobby
    Stay(Connection),
}

/// Lobby session of one user
pub struct LobbyWorker {
    username: String,
    conn: Connection,
    registry: RegistryHandle,
    config: Arc<ServerConfig>,
}

impl LobbyWorker {
    pub fn new(
        username: String,
        conn: Connection,
        registry: RegistryHandle,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            username,
            conn,
            registry,
            config,
        }
    }

    /// Interpret commands until the user enters a room or leaves
    ///
    /// Leaving from the lobby (`end`, disconnect, internal failure) releases
    /// the username and closes the connection.
    pub async fn run(self) {
        let LobbyWorker {
            username,
            mut conn,
            registry,
            config,
        } = self;
        let id = conn.id;

        let _ = conn.send(ServerMessage::Welcome).await;
        let _ = conn.send(ServerMessage::Actions).await;

        loop {
            let Some(line) = conn.next_line().await else {
                debug!("{} disconnected in the lobby", username);
                break;
            };
            if line.is_empty() {
                continue;
            }

            let command = match LobbyCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    debug!("{} sent bad command: {}", username, e);
                    let _ = conn.send(e.into()).await;
                    continue;
                }
            };

            let step = match command {
                LobbyCommand::End => break,
                LobbyCommand::List => list(&registry, conn).await,
                LobbyCommand::Join { room } => join(&registry, &username, conn, room).await,
                LobbyCommand::Create { room, max_users } => {
                    let max_users = max_users.unwrap_or(config.max_users);
                    create(&registry, &username, conn, room, max_users).await
                }
            };

            match step {
                Ok(Step::Entered) => return,
                Ok(Step::Stay(c)) => conn = c,
                Err(e) => {
                    warn!("Lobby for {} failed: {}", username, e);
                    break;
                }
            }
        }

        info!("{} left from the lobby", username);
        registry.deregister(username, id).await;
    }
}

/// `list`: one room name per line
async fn list(registry: &RegistryHandle, conn: Connection) -> Result<Step, AppError> {
    for name in registry.list_rooms().await? {
        conn.send(ServerMessage::RoomListing(name)).await?;
    }
    Ok(Step::Stay(conn))
}

/// `join <room>`
async fn join(
    registry: &RegistryHandle,
    username: &str,
    conn: Connection,
    room: String,
) -> Result<Step, AppError> {
    let Some(handle) = registry.find_room(RoomName::from(room.as_str())).await? else {
        let _ = conn.send(AppError::RoomNotFound(room).into()).await;
        return Ok(Step::Stay(conn));
    };

    let outcome = handle.join(username.to_string(), conn).await?;
    settle(outcome, room).await
}

/// `create <room> [maxUsers]`
async fn create(
    registry: &RegistryHandle,
    username: &str,
    conn: Connection,
    room: String,
    max_users: usize,
) -> Result<Step, AppError> {
    let (request, outcome) = JoinRequest::new(username.to_string(), conn, true);

    match registry
        .create_room(RoomName::from(room.as_str()), max_users, request)
        .await?
    {
        CreateOutcome::Created => settle(await_outcome(outcome, &room).await?, room).await,
        CreateOutcome::Rejected(err, request) => {
            let _ = request.conn.send(err.into()).await;
            Ok(Step::Stay(request.conn))
        }
    }
}

async fn await_outcome(
    outcome: oneshot::Receiver<JoinOutcome>,
    room: &str,
) -> Result<JoinOutcome, AppError> {
    outcome
        .await
        .map_err(|_| AppError::RoomClosed(room.to_string()))
}

/// Tell a rejected user why, and keep them in the lobby
async fn settle(outcome: JoinOutcome, room: String) -> Result<Step, AppError> {
    match outcome {
        JoinOutcome::Admitted => Ok(Step::Entered),
        JoinOutcome::Full(conn) => {
            let _ = conn.send(AppError::RoomFull(room).into()).await;
            Ok(Step::Stay(conn))
        }
        JoinOutcome::Closed(conn) => {
            let _ = conn.send(AppError::RoomClosed(room).into()).await;
            Ok(Step::Stay(conn))
        }
    }
}
