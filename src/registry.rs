//! Registry actor implementation
//!
//! The single owner of the global username registry and the global room
//! registry. Every lookup and mutation is a `RegistryCommand` processed one
//! at a time, so username check-and-insert and room check-and-create are
//! atomic without locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::{try_send, Outbound};
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::room::{spawn_room, JoinRequest, RoomHandle};
use crate::types::{ConnectionId, RoomName};

/// Commands sent to the Registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Claim a username for a connection
    Register {
        username: String,
        id: ConnectionId,
        outbound: Outbound,
        reply: oneshot::Sender<bool>,
    },
    /// Release a username (connection gone)
    Deregister { username: String, id: ConnectionId },
    /// Names of all live rooms
    ListRooms { reply: oneshot::Sender<Vec<String>> },
    /// Look a room up by name
    FindRoom {
        name: RoomName,
        reply: oneshot::Sender<Option<RoomHandle>>,
    },
    /// Create a room with its creator as first join request
    CreateRoom {
        name: RoomName,
        max_users: usize,
        creator: JoinRequest,
        reply: oneshot::Sender<CreateOutcome>,
    },
    /// A room manager reached `Stopped`
    RoomClosed { name: RoomName },
    /// Send a line to every registered user
    Announce { message: ServerMessage },
    /// Counters for logs and tests
    Stats { reply: oneshot::Sender<RegistryStats> },
}

/// Answer to `CreateRoom`
#[derive(Debug)]
pub enum CreateOutcome {
    /// Room published, creator's join queued first
    Created,
    /// Room not created; the creator's request (and connection) comes back
    Rejected(AppError, JoinRequest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub users: usize,
    pub rooms: usize,
}

/// Registered user entry
#[derive(Debug)]
struct UserEntry {
    id: ConnectionId,
    outbound: Outbound,
}

/// The Registry actor
pub struct Registry {
    /// All registered users: username -> connection
    users: HashMap<String, UserEntry>,
    /// All live rooms: name -> handle
    rooms: HashMap<RoomName, RoomHandle>,
    config: Arc<ServerConfig>,
    /// Own handle, given to every room manager it starts; keeps the
    /// command channel open
    handle: RegistryHandle,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        handle: RegistryHandle,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            users: HashMap::new(),
            rooms: HashMap::new(),
            config,
            handle,
            receiver,
        }
    }

    /// Run the Registry event loop
    ///
    /// The registry holds a handle to itself for the rooms it starts, and
    /// the default room's manager never exits, so the loop only ends with
    /// the runtime.
    pub async fn run(mut self) {
        info!("Registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                username,
                id,
                outbound,
                reply,
            } => {
                let _ = reply.send(self.handle_register(username, id, outbound));
            }
            RegistryCommand::Deregister { username, id } => {
                self.handle_deregister(username, id);
            }
            RegistryCommand::ListRooms { reply } => {
                let mut names: Vec<String> = self.rooms.keys().map(|n| n.to_string()).collect();
                names.sort();
                let _ = reply.send(names);
            }
            RegistryCommand::FindRoom { name, reply } => {
                let _ = reply.send(self.rooms.get(&name).cloned());
            }
            RegistryCommand::CreateRoom {
                name,
                max_users,
                creator,
                reply,
            } => {
                let _ = reply.send(self.handle_create_room(name, max_users, creator));
            }
            RegistryCommand::RoomClosed { name } => {
                self.handle_room_closed(name);
            }
            RegistryCommand::Announce { message } => {
                for entry in self.users.values() {
                    let _ = try_send(&entry.outbound, message.clone());
                }
            }
            RegistryCommand::Stats { reply } => {
                let _ = reply.send(RegistryStats {
                    users: self.users.len(),
                    rooms: self.rooms.len(),
                });
            }
        }
    }

    /// Start the persistent room
    fn open_default_room(&mut self) {
        let name = RoomName::from(self.config.default_room.as_str());
        let (room, _) = spawn_room(
            name.clone(),
            self.config.max_users,
            true,
            self.handle.clone(),
            &self.config,
        );
        self.rooms.insert(name, room);
    }

    /// Handle username registration
    fn handle_register(&mut self, username: String, id: ConnectionId, outbound: Outbound) -> bool {
        if self.users.contains_key(&username) {
            debug!("Username '{}' already in use, rejecting {}", username, id);
            return false;
        }

        info!("Connection {} registered as '{}'", id, username);
        self.users.insert(username, UserEntry { id, outbound });
        debug!(
            "Total users: {}, Total rooms: {}",
            self.users.len(),
            self.rooms.len()
        );
        true
    }

    /// Handle username release
    ///
    /// Only the connection that registered a name can release it.
    fn handle_deregister(&mut self, username: String, id: ConnectionId) {
        match self.users.get(&username) {
            Some(entry) if entry.id == id => {
                self.users.remove(&username);
                info!("'{}' deregistered", username);
            }
            Some(_) => warn!("Connection {} tried to release '{}'", id, username),
            None => debug!("'{}' was not registered", username),
        }
    }

    /// Handle room creation
    fn handle_create_room(
        &mut self,
        name: RoomName,
        max_users: usize,
        creator: JoinRequest,
    ) -> CreateOutcome {
        if self.rooms.contains_key(&name) {
            return CreateOutcome::Rejected(AppError::RoomExists(name.to_string()), creator);
        }

        let (room, _) = spawn_room(
            name.clone(),
            max_users,
            false,
            self.handle.clone(),
            &self.config,
        );

        // The fresh join queue is empty, so the creator is admitted first
        if let Err(creator) = room.enqueue(creator) {
            warn!("Could not queue creator of {}", name);
            return CreateOutcome::Rejected(AppError::RoomClosed(name.to_string()), creator);
        }

        info!("Chatroom {} created (max {} users)", name, max_users.max(1));
        self.rooms.insert(name, room);
        CreateOutcome::Created
    }

    /// Handle room teardown: the name becomes available again
    fn handle_room_closed(&mut self, name: RoomName) {
        if name.as_str() == self.config.default_room {
            warn!("Ignoring close of the default room");
            return;
        }
        if self.rooms.remove(&name).is_some() {
            debug!("Room {} removed from registry", name);
        }
    }
}

/// Cloneable handle for talking to the Registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Start the Registry actor along with the default room
    pub fn spawn(config: Arc<ServerConfig>) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let handle = Self { sender };

        let mut registry = Registry::new(receiver, handle.clone(), config);
        registry.open_default_room();
        tokio::spawn(registry.run());

        handle
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), AppError> {
        self.sender.send(cmd).await.map_err(|_| AppError::ChannelSend)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, AppError> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| AppError::ChannelSend)
    }

    /// Claim `username`; fails with `UsernameInUse` if it is taken
    pub async fn register(
        &self,
        username: String,
        id: ConnectionId,
        outbound: Outbound,
    ) -> Result<(), AppError> {
        let name = username.clone();
        let accepted = self
            .request(|reply| RegistryCommand::Register {
                username,
                id,
                outbound,
                reply,
            })
            .await?;

        if accepted {
            Ok(())
        } else {
            Err(AppError::UsernameInUse(name))
        }
    }

    pub async fn deregister(&self, username: String, id: ConnectionId) {
        let _ = self.send(RegistryCommand::Deregister { username, id }).await;
    }

    pub async fn list_rooms(&self) -> Result<Vec<String>, AppError> {
        self.request(|reply| RegistryCommand::ListRooms { reply })
            .await
    }

    pub async fn find_room(&self, name: RoomName) -> Result<Option<RoomHandle>, AppError> {
        self.request(|reply| RegistryCommand::FindRoom { name, reply })
            .await
    }

    pub async fn create_room(
        &self,
        name: RoomName,
        max_users: usize,
        creator: JoinRequest,
    ) -> Result<CreateOutcome, AppError> {
        self.request(|reply| RegistryCommand::CreateRoom {
            name,
            max_users,
            creator,
            reply,
        })
        .await
    }

    pub async fn room_closed(&self, name: RoomName) {
        let _ = self.send(RegistryCommand::RoomClosed { name }).await;
    }

    pub async fn announce(&self, message: ServerMessage) {
        let _ = self.send(RegistryCommand::Announce { message }).await;
    }

    pub async fn stats(&self) -> Result<RegistryStats, AppError> {
        self.request(|reply| RegistryCommand::Stats { reply }).await
    }
}
