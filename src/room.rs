//! Chatroom state and the per-room manager actor
//!
//! Each active room runs two tasks: a `RoomManager`, the single owner of
//! the room's membership, and a `Broadcaster`. Joins and leaves reach the
//! manager through two bounded queues and are processed one at a time, so
//! every room has one total order of membership changes. Chat messages
//! bypass the manager and go straight to the broadcaster's inbox.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::{Broadcaster, RosterUpdate};
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::AppError;
use crate::message::{ChatMessage, ServerMessage};
use crate::registry::RegistryHandle;
use crate::session::Session;
use crate::types::{ConnectionId, RoomName};

/// Room membership
///
/// A capacity-bounded set of usernames. The persistent (default) room is
/// never torn down; any other room stops when its last member leaves.
#[derive(Debug)]
pub struct Chatroom {
    /// Room name, key in the room registry
    pub name: RoomName,
    /// Current members: username -> connection
    members: HashMap<String, ConnectionId>,
    /// Capacity, at least 1
    max_members: usize,
    /// Exempt from teardown
    persistent: bool,
}

impl Chatroom {
    /// Create an empty room. A capacity of 0 is raised to 1.
    pub fn new(name: RoomName, max_members: usize, persistent: bool) -> Self {
        Self {
            name,
            members: HashMap::new(),
            max_members: max_members.max(1),
            persistent,
        }
    }

    pub fn max_members(&self) -> usize {
        self.max_members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if room is at capacity
    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_members
    }

    pub fn contains(&self, username: &str) -> bool {
        self.members.contains_key(username)
    }

    /// Add a member
    ///
    /// Returns false, leaving membership unchanged, if the room is full or
    /// the user is already a member.
    pub fn admit(&mut self, username: &str, id: ConnectionId) -> bool {
        if self.is_full() || self.contains(username) {
            return false;
        }
        self.members.insert(username.to_string(), id);
        true
    }

    /// Remove a member, returning its connection id if it was present
    pub fn remove(&mut self, username: &str) -> Option<ConnectionId> {
        self.members.remove(username)
    }

    /// True once a non-persistent room has no members left
    pub fn should_stop(&self) -> bool {
        !self.persistent && self.members.is_empty()
    }
}

/// Lifecycle of a room manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Admitting members, broadcaster active
    Running,
    /// Shutdown decided, pending joins are being turned away
    Draining,
    /// Terminal
    Stopped,
}

/// Answer to a join request
#[derive(Debug)]
pub enum JoinOutcome {
    /// The user is now a member; the room owns the connection
    Admitted,
    /// Room at capacity, connection handed back
    Full(Connection),
    /// Room stopped before admitting, connection handed back
    Closed(Connection),
}

/// A user asking to enter a room, together with their connection
#[derive(Debug)]
pub struct JoinRequest {
    pub username: String,
    pub conn: Connection,
    /// The user is creating this room
    pub creator: bool,
    pub reply: oneshot::Sender<JoinOutcome>,
}

impl JoinRequest {
    pub fn new(
        username: String,
        conn: Connection,
        creator: bool,
    ) -> (Self, oneshot::Receiver<JoinOutcome>) {
        let (reply, outcome) = oneshot::channel();
        let request = Self {
            username,
            conn,
            creator,
            reply,
        };
        (request, outcome)
    }
}

/// Cloneable handle to a running room, stored in the room registry
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub name: RoomName,
    joins: mpsc::Sender<JoinRequest>,
}

impl RoomHandle {
    /// Ask the room manager to admit `username`
    pub async fn join(&self, username: String, conn: Connection) -> Result<JoinOutcome, AppError> {
        let (request, outcome) = JoinRequest::new(username, conn, false);

        if let Err(mpsc::error::SendError(request)) = self.joins.send(request).await {
            return Ok(JoinOutcome::Closed(request.conn));
        }

        outcome
            .await
            .map_err(|_| AppError::RoomClosed(self.name.to_string()))
    }

    /// Queue a join without waiting; fails only if the join queue is full
    /// or closed
    pub(crate) fn enqueue(&self, request: JoinRequest) -> Result<(), JoinRequest> {
        self.joins.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(request)
            | mpsc::error::TrySendError::Closed(request) => request,
        })
    }
}

/// Start the manager and broadcaster of a new room
///
/// Returns the handle to publish in the room registry and the manager's
/// task, which finishes when the room reaches `Stopped`.
pub fn spawn_room(
    name: RoomName,
    max_members: usize,
    persistent: bool,
    registry: RegistryHandle,
    config: &ServerConfig,
) -> (RoomHandle, JoinHandle<()>) {
    let capacity = config.queue_capacity;
    let (join_tx, join_rx) = mpsc::channel(capacity);
    let (leave_tx, leave_rx) = mpsc::channel(capacity);
    let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
    let (roster_tx, roster_rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let broadcaster = Broadcaster::new(name.clone(), inbox_rx, roster_rx, shutdown_rx);
    tokio::spawn(broadcaster.run());

    let manager = RoomManager {
        room: Chatroom::new(name.clone(), max_members, persistent),
        state: RoomState::Running,
        joins: join_rx,
        leaves: leave_rx,
        leave_tx,
        inbox: inbox_tx,
        roster: roster_tx,
        shutdown: Some(shutdown_tx),
        registry,
    };
    let task = tokio::spawn(manager.run());

    let handle = RoomHandle {
        name,
        joins: join_tx,
    };
    (handle, task)
}

/// The per-room actor owning membership
pub struct RoomManager {
    room: Chatroom,
    state: RoomState,
    joins: mpsc::Receiver<JoinRequest>,
    leaves: mpsc::Receiver<String>,
    /// Cloned into every session worker
    leave_tx: mpsc::Sender<String>,
    /// Cloned into every session worker
    inbox: mpsc::Sender<ChatMessage>,
    roster: mpsc::Sender<RosterUpdate>,
    shutdown: Option<oneshot::Sender<()>>,
    registry: RegistryHandle,
}

impl RoomManager {
    /// Run the membership event loop
    ///
    /// Exactly one join or leave is processed per iteration.
    pub async fn run(mut self) {
        info!("Chatroom {} started", self.room.name);

        while self.state == RoomState::Running {
            tokio::select! {
                Some(request) = self.joins.recv() => self.handle_join(request).await,
                Some(username) = self.leaves.recv() => self.handle_leave(username).await,
                else => break,
            }
        }

        self.drain().await;
        info!("Chatroom {} stopped", self.room.name);
    }

    /// Admit a user, or hand the connection back if the room is full
    async fn handle_join(&mut self, request: JoinRequest) {
        let JoinRequest {
            username,
            conn,
            creator,
            reply,
        } = request;

        if !self.room.admit(&username, conn.id) {
            info!(
                "{} rejected from {}: at max capacity ({})",
                username,
                self.room.name,
                self.room.max_members()
            );
            let _ = reply.send(JoinOutcome::Full(conn));
            return;
        }

        let Connection {
            id,
            reader,
            outbound,
        } = conn;

        // The broadcaster writes the status lines, so they precede any
        // broadcast this member receives
        let room = self.room.name.to_string();
        let mut greeting = Vec::with_capacity(2);
        if creator {
            greeting.push(ServerMessage::Creating(room.clone()));
        }
        greeting.push(ServerMessage::Joining(room));

        if self
            .roster
            .send(RosterUpdate::Add {
                username: username.clone(),
                outbound,
                greeting,
            })
            .await
            .is_err()
        {
            warn!("Broadcaster for {} is gone", self.room.name);
        }

        let session = Session::new(
            username.clone(),
            id,
            reader,
            self.room.name.clone(),
            self.inbox.clone(),
            self.leave_tx.clone(),
        );
        tokio::spawn(session.run());

        info!(
            "{} connected to {} ({}/{})",
            username,
            self.room.name,
            self.room.len(),
            self.room.max_members()
        );
        let _ = reply.send(JoinOutcome::Admitted);
    }

    /// Remove a member and tear its connection down
    async fn handle_leave(&mut self, username: String) {
        let Some(id) = self.room.remove(&username) else {
            debug!("{} is not a member of {}", username, self.room.name);
            return;
        };

        info!("{} disconnected from {}", username, self.room.name);

        let _ = self
            .roster
            .send(RosterUpdate::Remove {
                username: username.clone(),
            })
            .await;
        self.registry.deregister(username, id).await;

        if self.room.should_stop() {
            self.state = RoomState::Draining;
        }
    }

    /// Turn away pending joins, stop the broadcaster, unpublish the room
    async fn drain(&mut self) {
        if self.state != RoomState::Draining {
            return;
        }

        info!("Shutting down {} chatroom", self.room.name);

        self.joins.close();
        while let Ok(request) = self.joins.try_recv() {
            debug!("Turning {} away from {}", request.username, self.room.name);
            let _ = request.reply.send(JoinOutcome::Closed(request.conn));
        }

        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        self.registry.room_closed(self.room.name.clone()).await;
        self.state = RoomState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use tokio::time::timeout;

    use super::*;
    use crate::connection::testing::{connection_pair, Peer};

    #[test]
    fn test_room_creation() {
        let room = Chatroom::new("tavern".into(), 2, false);
        assert_eq!(room.name.as_str(), "tavern");
        assert!(room.is_empty());
        assert!(!room.is_full());
        assert_eq!(room.max_members(), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let room = Chatroom::new("tiny".into(), 0, false);
        assert_eq!(room.max_members(), 1);
    }

    #[test]
    fn test_room_capacity() {
        let mut room = Chatroom::new("tavern".into(), 2, false);
        assert!(room.admit("alice", ConnectionId::new()));
        assert!(room.admit("bob", ConnectionId::new()));
        assert!(room.is_full());

        // Cannot exceed capacity, membership unchanged
        assert!(!room.admit("carol", ConnectionId::new()));
        assert_eq!(room.len(), 2);
        assert!(!room.contains("carol"));
    }

    #[test]
    fn test_room_rejects_duplicate_member() {
        let mut room = Chatroom::new("tavern".into(), 4, false);
        assert!(room.admit("alice", ConnectionId::new()));
        assert!(!room.admit("alice", ConnectionId::new()));
        assert_eq!(room.len(), 1);
    }

    #[test]
    fn test_room_remove() {
        let mut room = Chatroom::new("tavern".into(), 2, false);
        let id = ConnectionId::new();
        room.admit("alice", id);

        assert_eq!(room.remove("alice"), Some(id));
        assert_eq!(room.remove("alice"), None);
        assert!(room.should_stop());
    }

    #[test]
    fn test_persistent_room_never_stops() {
        let mut room = Chatroom::new("default".into(), 2, true);
        assert!(!room.should_stop());
        room.admit("alice", ConnectionId::new());
        room.remove("alice");
        assert!(!room.should_stop());
    }

    fn registry() -> RegistryHandle {
        RegistryHandle::spawn(Arc::new(ServerConfig::default()))
    }

    async fn read(peer: &mut Peer) -> String {
        timeout(Duration::from_secs(2), peer.next())
            .await
            .expect("timed out")
            .expect("closed")
            .unwrap()
    }

    #[tokio::test]
    async fn test_join_admits_until_full() {
        let (room, _task) =
            spawn_room("tavern".into(), 1, false, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        let outcome = room.join("alice".to_string(), alice).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Admitted));
        assert_eq!(read(&mut alice_peer).await, "Joining tavern");

        let (bob, _bob_peer) = connection_pair().await;
        let outcome = room.join("bob".to_string(), bob).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Full(_)));
    }

    #[tokio::test]
    async fn test_concurrent_joins_respect_capacity() {
        let (room, _task) =
            spawn_room("tavern".into(), 2, false, registry(), &ServerConfig::default());

        let mut peers = Vec::new();
        let mut joins = Vec::new();
        for i in 0..16 {
            let (conn, peer) = connection_pair().await;
            peers.push(peer);

            let room = room.clone();
            joins.push(tokio::spawn(async move {
                room.join(format!("user{}", i), conn).await.unwrap()
            }));
        }

        let (mut admitted, mut full) = (0, 0);
        for join in joins {
            match join.await.unwrap() {
                JoinOutcome::Admitted => admitted += 1,
                JoinOutcome::Full(_) => full += 1,
                JoinOutcome::Closed(_) => panic!("Room closed while members present"),
            }
        }
        assert_eq!(admitted, 2);
        assert_eq!(full, 14);
    }

    #[tokio::test]
    async fn test_creator_hears_creating_then_joining() {
        let (room, _task) =
            spawn_room("tavern".into(), 4, false, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        let (request, outcome) = JoinRequest::new("alice".to_string(), alice, true);
        room.enqueue(request).unwrap();

        assert!(matches!(outcome.await.unwrap(), JoinOutcome::Admitted));
        assert_eq!(read(&mut alice_peer).await, "Creating chatroom tavern");
        assert_eq!(read(&mut alice_peer).await, "Joining tavern");
    }

    #[tokio::test]
    async fn test_members_hear_each_other() {
        let (room, _task) =
            spawn_room("tavern".into(), 4, false, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        room.join("alice".to_string(), alice).await.unwrap();
        read(&mut alice_peer).await;

        let (bob, mut bob_peer) = connection_pair().await;
        room.join("bob".to_string(), bob).await.unwrap();
        read(&mut bob_peer).await;

        bob_peer.send("hello").await.unwrap();
        assert_eq!(read(&mut alice_peer).await, "bob: hello");
        assert_eq!(read(&mut bob_peer).await, "bob: hello");
    }

    #[tokio::test]
    async fn test_last_leave_stops_room() {
        let (room, task) =
            spawn_room("tavern".into(), 4, false, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        room.join("alice".to_string(), alice).await.unwrap();
        read(&mut alice_peer).await;

        alice_peer.send("end").await.unwrap();
        timeout(Duration::from_secs(2), task)
            .await
            .expect("room did not stop")
            .unwrap();

        // Alice's socket is closed by the server
        let next = timeout(Duration::from_secs(2), alice_peer.next())
            .await
            .expect("socket was not closed");
        assert!(next.is_none());

        // A stopped room hands the connection back
        let (bob, _bob_peer) = connection_pair().await;
        let outcome = room.join("bob".to_string(), bob).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Closed(_)));
    }

    #[tokio::test]
    async fn test_abrupt_disconnect_frees_a_seat() {
        let (room, _task) =
            spawn_room("tavern".into(), 2, false, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        room.join("alice".to_string(), alice).await.unwrap();
        read(&mut alice_peer).await;
        let (bob, bob_peer) = connection_pair().await;
        room.join("bob".to_string(), bob).await.unwrap();

        drop(bob_peer);

        // Bob's leave is processed before a later join
        let mut admitted = false;
        for _ in 0..50 {
            let (carol, _carol_peer) = connection_pair().await;
            match room.join("carol".to_string(), carol).await.unwrap() {
                JoinOutcome::Admitted => {
                    admitted = true;
                    break;
                }
                _ => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        assert!(admitted);
    }

    #[tokio::test]
    async fn test_persistent_room_survives_empty() {
        let (room, mut task) =
            spawn_room("default".into(), 4, true, registry(), &ServerConfig::default());

        let (alice, mut alice_peer) = connection_pair().await;
        room.join("alice".to_string(), alice).await.unwrap();
        read(&mut alice_peer).await;
        alice_peer.send("end").await.unwrap();

        assert!(timeout(Duration::from_millis(300), &mut task).await.is_err());

        let (bob, _bob_peer) = connection_pair().await;
        let outcome = room.join("bob".to_string(), bob).await.unwrap();
        assert!(matches!(outcome, JoinOutcome::Admitted));
    }
}
