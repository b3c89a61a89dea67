//! Connection struct definition
//!
//! Wraps an accepted TCP stream as a line reader plus an outbound queue
//! drained by a dedicated writer task. The socket is closed once the reader
//! and every clone of the outbound sender have been dropped.

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Server → Client line queue of one connection
pub type Outbound = mpsc::Sender<ServerMessage>;

/// Client → Server line stream of one connection
pub type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;

/// A connected client, handed from stage to stage
///
/// Ownership moves registration → lobby → room manager, which splits it
/// into the session's reader and the broadcaster's outbound sender.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Incoming lines
    pub reader: LineReader,
    /// Outgoing lines
    pub outbound: Outbound,
}

impl Connection {
    /// Frame a TCP stream and spawn its writer task
    pub fn spawn(stream: TcpStream, config: &ServerConfig) -> Self {
        let id = ConnectionId::new();
        let (read_half, write_half) = stream.into_split();

        let reader = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(config.max_line_length),
        );
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let (outbound, mut outbound_rx) =
            mpsc::channel::<ServerMessage>(config.outbound_capacity);

        // Write task (ServerMessage -> socket)
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if writer.send(msg.to_string()).await.is_err() {
                    debug!("Socket write failed, ending write task for {}", id);
                    break;
                }
            }

            // Every sender is gone: flush and shut the write half down
            let _ = SinkExt::<String>::close(&mut writer).await;
            debug!("Write task ended for {}", id);
        });

        Self {
            id,
            reader,
            outbound,
        }
    }

    /// Queue a line for this connection
    ///
    /// Waits while the outbound queue is full. Returns an error if the
    /// writer task has ended (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Read the next line
    ///
    /// End of stream and read failures both yield `None`; callers treat
    /// them as an implicit `end`.
    pub async fn next_line(&mut self) -> Option<String> {
        next_line(self.id, &mut self.reader).await
    }
}

/// Read the next line from a framed reader, folding errors into `None`
pub async fn next_line(id: ConnectionId, reader: &mut LineReader) -> Option<String> {
    match reader.next().await {
        Some(Ok(line)) => Some(line),
        Some(Err(e)) => {
            debug!("Read error for {}: {}", id, e);
            None
        }
        None => None,
    }
}

/// Queue a line without waiting
///
/// Used for fan-out, where one slow client must not hold up the others.
pub fn try_send(outbound: &Outbound, msg: ServerMessage) -> Result<(), SendError> {
    outbound.try_send(msg).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => SendError::Full,
        mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
    })
}
