//! Broadcaster: per-room fan-out of chat messages
//!
//! The room manager is the only component that changes membership. It
//! mirrors every admission and removal here as a `RosterUpdate`, and the
//! broadcaster delivers each inbox message to the roster it holds at
//! dequeue time.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::connection::{try_send, Outbound};
use crate::error::SendError;
use crate::message::{ChatMessage, ServerMessage};
use crate::types::RoomName;

/// Membership change mirrored from the room manager
#[derive(Debug)]
pub enum RosterUpdate {
    /// A member was admitted; `greeting` is written to them before any
    /// broadcast
    Add {
        username: String,
        outbound: Outbound,
        greeting: Vec<ServerMessage>,
    },
    /// A member left
    Remove { username: String },
}

/// One broadcaster task per active room
pub struct Broadcaster {
    room: RoomName,
    /// Current members: username -> outbound queue
    members: HashMap<String, Outbound>,
    /// Messages from session workers, FIFO
    inbox: mpsc::Receiver<ChatMessage>,
    /// Membership changes from the room manager
    roster: mpsc::Receiver<RosterUpdate>,
    /// Fired once by the room manager on teardown
    shutdown: oneshot::Receiver<()>,
}

impl Broadcaster {
    pub fn new(
        room: RoomName,
        inbox: mpsc::Receiver<ChatMessage>,
        roster: mpsc::Receiver<RosterUpdate>,
        shutdown: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            room,
            members: HashMap::new(),
            inbox,
            roster,
            shutdown,
        }
    }

    /// Run the fan-out loop until shutdown
    ///
    /// Shutdown wins over pending work, and roster updates are applied
    /// before the next message is delivered.
    pub async fn run(mut self) {
        debug!("Broadcaster for {} started", self.room);

        loop {
            tokio::select! {
                biased;
                _ = &mut self.shutdown => break,
                Some(update) = self.roster.recv() => self.apply(update),
                Some(msg) = self.inbox.recv() => self.fan_out(&msg),
                else => break,
            }
        }

        info!("Broadcaster for {} stopped", self.room);
    }

    fn apply(&mut self, update: RosterUpdate) {
        match update {
            RosterUpdate::Add {
                username,
                outbound,
                greeting,
            } => {
                for line in greeting {
                    if let Err(e) = try_send(&outbound, line) {
                        warn!("Greeting for {} in {} not sent: {}", username, self.room, e);
                    }
                }
                self.members.insert(username, outbound);
            }
            RosterUpdate::Remove { username } => {
                self.members.remove(&username);
            }
        }
    }

    /// Deliver one message to every current member
    ///
    /// A member whose queue is full or closed misses this message; the
    /// others are unaffected.
    fn fan_out(&self, msg: &ChatMessage) {
        for (username, outbound) in &self.members {
            match try_send(outbound, ServerMessage::Chat(msg.text.clone())) {
                Ok(()) => {}
                Err(SendError::Full) => {
                    warn!(
                        "Dropped message from {} to {} in {}: queue full",
                        msg.sender, username, self.room
                    );
                }
                Err(SendError::ChannelClosed) => {
                    debug!("{} in {} already disconnected", username, self.room);
                }
            }
        }
    }
}
