//! Session worker: one per room member
//!
//! Reads the member's lines and turns them into chat messages for the
//! room's broadcaster, or into a single leave request when the member is
//! done. It never touches membership itself.

use tokio::sync::mpsc;
use tracing::debug;

use crate::connection::{next_line, LineReader};
use crate::message::{ChatMessage, END};
use crate::types::{ConnectionId, RoomName};

pub struct Session {
    username: String,
    id: ConnectionId,
    reader: LineReader,
    room: RoomName,
    /// The room broadcaster's inbox
    inbox: mpsc::Sender<ChatMessage>,
    /// The room manager's leave queue
    leaves: mpsc::Sender<String>,
}

impl Session {
    pub fn new(
        username: String,
        id: ConnectionId,
        reader: LineReader,
        room: RoomName,
        inbox: mpsc::Sender<ChatMessage>,
        leaves: mpsc::Sender<String>,
    ) -> Self {
        Self {
            username,
            id,
            reader,
            room,
            inbox,
            leaves,
        }
    }

    /// Forward lines until `end`, end of stream or a read error, then
    /// request removal from the room
    pub async fn run(mut self) {
        while let Some(line) = next_line(self.id, &mut self.reader).await {
            if line == END {
                debug!("{} sent end in {}", self.username, self.room);
                break;
            }
            if line.is_empty() {
                continue;
            }

            // Waits while the inbox is full
            let msg = ChatMessage::new(&self.username, &line);
            if self.inbox.send(msg).await.is_err() {
                debug!("Broadcaster for {} is gone", self.room);
                break;
            }
        }

        // Close our side of the socket; the write side closes once the
        // manager has dropped this member's outbound queue
        drop(self.reader);

        debug!("{} disconnected from {}", self.username, self.room);
        let _ = self.leaves.send(self.username).await;
    }
}
