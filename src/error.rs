//! Error types for the chat server
//!
//! Defines application-level errors and outbound send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Covers both fatal errors (connection or process termination) and
/// protocol errors (reply with a notice, keep the connection in its stage).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection, or the process at startup)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing error (over-long line or IO failure while reading)
    #[error("Line codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Outbound queue of a connection is closed or full
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// Username is already registered by another connection
    #[error("Username already in use: {0}")]
    UsernameInUse(String),

    /// No room with the given name
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// A room with the given name already exists
    #[error("Room already exists: {0}")]
    RoomExists(String),

    /// Room is at max capacity
    #[error("Room is full: {0}")]
    RoomFull(String),

    /// Known command with the wrong number of arguments
    #[error("Invalid {0} command")]
    InvalidCommand(&'static str),

    /// Unknown lobby command
    #[error("Command doesn't exist: {0}")]
    UnknownCommand(String),

    /// Room manager stopped before answering
    #[error("Room closed: {0}")]
    RoomClosed(String),
}

/// Outbound send errors
///
/// Occurs when a line cannot be queued for a connection's writer task.
#[derive(Debug, Error)]
pub enum SendError {
    /// The writer task has ended (peer disconnected)
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound queue is full (peer is not reading)
    #[error("Channel full")]
    Full,
}
